//! Prompt templates for classification and answering.

/// System preamble for the classifier.
pub const CLASSIFIER_PREAMBLE: &str =
    "You are an email classification assistant. Reply with the category word only.";

/// System preamble for the responder.
pub const RESPONDER_PREAMBLE: &str =
    "You are a professional email assistant. You answer the questions people send you by email.";

/// Build the classification request.
pub fn classification_prompt(subject: &str, sender: &str, body_excerpt: &str) -> String {
    format!(
        "Classify the following email. Return only the category: code, question or spam.\n\n\
         Rules:\n\
         1. The email contains executable Python code -> code\n\
         2. The email contains a question that needs an answer -> question\n\
         3. The email is advertising or marketing -> spam\n\n\
         Subject: {subject}\n\
         From: {sender}\n\
         Body:\n\
         {body_excerpt}\n\n\
         Return the single category word and nothing else."
    )
}

/// Build the answering request.
pub fn answer_prompt(subject: &str, sender: &str, body: &str) -> String {
    format!(
        "Answer the questions in the following email.\n\n\
         Subject: {subject}\n\
         From: {sender}\n\
         Body:\n\
         {body}\n\n\
         Reply in a friendly, professional tone."
    )
}
