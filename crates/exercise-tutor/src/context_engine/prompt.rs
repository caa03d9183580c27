//! Tutoring instruction sent with every assistance request

use crate::task::TaskDescription;

/// Compose the tutoring instruction for `code`.
///
/// The learner's code appears twice: once as the attempt to review and once
/// in the rule that nothing else may be considered.
pub fn tutoring_instruction(task: &TaskDescription, code: &str) -> String {
    format!(
        "I am working on a programming exercise under exam-like conditions and need focused help. \
The exercise is: {task}\n\
My current attempt is:\n{code}\n\
This is the only code you may consider. Do not base your answer on any code other than:\n{code}\n\
Begin your answer by restating the exact code you are evaluating so I can see what you received. \
I am not asking for a solution. Instead give me:\n\
1) Analysis: where and why my code falls short of the exercise, pointing at specific lines or logic. \
Explain in prose only.\n\
2) Concepts: which Python concepts, functions or operators I should study to meet the exercise. \
Explain in prose only.\n\
3) Next steps: concrete changes in approach I could try. Explain in prose only.\n\
Rules:\n\
- Never include solution code, or any code beyond restating my attempt.\n\
- If my code already solves the exercise in any way, say so plainly and give no further suggestions.",
        task = task.as_str(),
        code = code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_embeds_task_and_code_twice() {
        let task = TaskDescription::new("Add two numbers.");
        let code = "def add(a, b):\n    return a - b";
        let text = tutoring_instruction(&task, code);

        assert!(text.contains("Add two numbers."));
        assert_eq!(text.matches(code).count(), 2);
        assert!(text.contains("Never include solution code"));
        assert!(text.contains("already solves the exercise"));
        assert!(text.contains("restating the exact code"));
    }
}
