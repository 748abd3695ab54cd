// All LLM prompt constants for the interview module.
// Replace `{placeholders}` before sending.

/// First-question prompt. Replace `{name}` and `{topic}`.
pub const FIRST_QUESTION_PROMPT_TEMPLATE: &str = "Start an interview with a candidate named \
\"{name}\" on the topic \"{topic}\". \
KEEP IT BRIEF, just provide the first question. DO NOT add explanations. \
The question should be relevant to the field of \"{topic}\".";

/// Next-question prompt. Replace `{topic}` and `{history}`.
pub const NEXT_QUESTION_PROMPT_TEMPLATE: &str = "Below is the history of an interview on the \
topic \"{topic}\". \
Please provide the next question ONLY based on the candidate's previous answer. \
KEEP IT BRIEF, just provide the next question. DO NOT add explanations. \
If the candidate wants to end the interview, provide a conclusion and mark the interview \
as completed.\n\nInterview history:\n{history}";
