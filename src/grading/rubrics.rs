/// One rubric criterion and the JSON field the model reports it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub letter: char,
    pub name: &'static str,
    pub field: &'static str,
    pub question: &'static str,
}

/// The four graded criteria, in the order the model is asked to score them.
pub const CRITERIA: [Criterion; 4] = [
    Criterion {
        letter: 'A',
        name: "Goal",
        field: "goal_score",
        question: "Did the user clearly state what they want Copilot to do?",
    },
    Criterion {
        letter: 'B',
        name: "Context",
        field: "context_score",
        question: "Did the user provide relevant background (audience, domain, constraints)?",
    },
    Criterion {
        letter: 'C',
        name: "Source",
        field: "source_score",
        question: "Did the user include references, examples, or data Copilot should use?",
    },
    Criterion {
        letter: 'D',
        name: "Expectation",
        field: "expectation_score",
        question: "Did the user specify output format, tone, length, and quality?",
    },
];

pub const TOTAL_FIELD: &str = "score";
pub const FEEDBACK_FIELD: &str = "feedback";
pub const ENHANCED_FIELD: &str = "enhanced_prompt";

const EVALUATOR_PREAMBLE: &str = "You are an expert prompt evaluator. Your task is to assess how well the user's prompt aligns with the following rubric and optionally reference the provided model answer.";

const PROMPT_RUBRIC: &str = r#"
Scoring Instructions:
- Rate each criterion (A, B, C, D) from 1 to 5 using the detailed descriptions below.
- Sum the four scores to produce a total score between 0 and 20.

Detailed Rubric:
A. Goal (Clarity of Purpose)
5 – Excellent: Clearly states desired outcome with no ambiguity.
4 – Good: Mostly clear goal; minor clarifications needed.
3 – Fair: Somewhat clear; leaves room for interpretation.
2 – Poor: Vague or partially missing goal.
1 – Very Poor: No clear goal; Copilot must guess user intent.

B. Context (Relevant Background Information)
5 – Excellent: All necessary background details provided (audience, domain, constraints).
4 – Good: Most relevant context included; minor details missing.
3 – Fair: Some context, but key details missing.
2 – Poor: Minimal context; important information lacking.
1 – Very Poor: No context; prompt isolated and unclear.

C. Source (Reference Material or Data)
5 – Excellent: Accurate sources, examples, or data included.
4 – Good: Some source material provided, but not comprehensive.
3 – Fair: Vague mention of sources without specifics.
2 – Poor: Sources suggested but not provided.
1 – Very Poor: No sources or references; relies on assumptions.

D. Expectation (Output Format & Quality)
5 – Excellent: Clearly specifies output type, tone, length, and quality standards.
4 – Good: Indicates output format but lacks minor details.
3 – Fair: General idea of output given, some ambiguity remains.
2 – Poor: Minimal guidance on output expectations.
1 – Very Poor: No indication of output format or quality.
"#;

const OUTPUT_REQUIREMENTS: &str = r#"
Output Requirements:
Return ONLY a valid JSON object with these fields:
- score: a sum of total score between 0 and 20
- goal_score: score for Goal (1-5)
- context_score: score for Context (1-5)
- source_score: score for Source (1-5)
- expectation_score: score for Expectation (1-5)
- feedback: a string explaining why the prompt is good or bad and how to improve it. Cover 1. Goal: Did the prompt clearly state what it wants Copilot to do? 2. Context: Did the prompt provide relevant background (audience, domain, constraints)? 3. Source: Did the prompt include references, examples, or data Copilot should use? 4. Expectation: Did the prompt specify output format, tone, length, and quality? Analyse each part one by one.
- enhanced_prompt: an improved version of the user's prompt that addresses the issues identified

Do not include additional text."#;

/// `A. Goal: <question>` lines, one per criterion.
fn criteria_summary() -> String {
    let mut summary = String::from("Evaluation Criteria:\n");
    for c in CRITERIA {
        summary.push_str(&format!("{}. {}: {}\n", c.letter, c.name, c.question));
    }
    summary
}

/// The full system instruction: preamble, criteria, rubric and output contract.
pub fn default_system_prompt() -> String {
    format!(
        "{}\n\n{}{}{}",
        EVALUATOR_PREAMBLE,
        criteria_summary(),
        PROMPT_RUBRIC,
        OUTPUT_REQUIREMENTS
    )
}

/// Builds the user message. A blank reference answer is left out entirely.
pub fn user_message(reference_answer: &str, submitted_text: &str) -> String {
    let mut message = String::new();
    if !reference_answer.trim().is_empty() {
        message.push_str(&format!("Model Answer:\n{}\n\n", reference_answer));
    }
    message.push_str(&format!(
        "Evaluate this prompt and return the JSON object described above for the following prompt:\n\n{}",
        submitted_text
    ));
    message
}
