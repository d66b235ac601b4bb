//! Prompt text sent to the completion service.

pub const DEFAULT_TESTCASE_INSTRUCTIONS: &str = "\
You are a senior QA engineer. Read the recorded Playwright UI automation script below \
and write the functional test cases it exercises. For each test case give an id, a title, \
preconditions, numbered steps and the expected result. Cover the happy path first, then \
the negative and edge cases a tester would add for the same screens. Plain text only.";

pub const DEFAULT_REFACTOR_INSTRUCTIONS: &str = "\
You are a senior SDET. Refactor the recorded Python Playwright script below into a clean, \
maintainable automation script: group the actions into well-named functions, add explicit \
waits and assertions for every page transition, honour the PLAYWRIGHT_HEADLESS environment \
variable when launching the browser, and exit with a non-zero status when a step fails. \
Keep every locator exactly as recorded. Return only the complete runnable Python script, \
with no markdown fences and no explanation.";

/// Asks the model to repair a failing candidate, anchoring it to the recorded
/// script so locators and helper functions are reused rather than invented.
pub fn repair_prompt(script_code: &str, logs: &str, reference_script: &str) -> String {
    format!(
        "\
Role: You are a senior SDET with deep expertise in Python, Playwright and reliable UI automation.
Task: Find the root cause of the failure recorded in the log below and apply a precise fix to the failing script.

Input:
    Failing script:
{script_code}
    Failure log:
{logs}
    Recorded script with the correct locators:
{reference_script}

Output requirements:
   - Respond with the complete, corrected, runnable script and nothing else.
   - No markdown formatting, no fenced code blocks, no explanations or comments about the changes.
   - Keep and reuse the recorded locators and functions; do not replace them with new ones.
   - No introductory or closing sentences.
   - The output must be ready to run unattended in a CI pipeline.
"
    )
}

pub fn testcases_prompt(instructions: &str, raw_script: &str) -> String {
    format!("{instructions}\nScript:\n{raw_script}\n")
}

pub fn refactor_prompt(instructions: &str, raw_script: &str) -> String {
    format!("{instructions}\n\n### Here is the code to refactor: {raw_script}\n")
}

pub fn chat_prompt(context: &str, question: &str) -> String {
    if context.is_empty() {
        return format!(
            "You are an expert Senior Software Development Engineer in Test. Answer the user query:\n{question}"
        );
    }
    format!("Use the following context from CodeGenie outputs:\n{context}\n\nAnswer the user query:\n{question}")
}

#[cfg(test)]
mod tests {
    use super::{chat_prompt, refactor_prompt, repair_prompt, testcases_prompt};

    #[test]
    fn repair_prompt_embeds_all_three_inputs_in_order() {
        let prompt = repair_prompt("CANDIDATE", "LOG", "RECORDED");
        let candidate = prompt.find("CANDIDATE").expect("candidate present");
        let log = prompt.find("LOG").expect("log present");
        let recorded = prompt.find("RECORDED").expect("reference present");
        assert!(candidate < log && log < recorded);
        assert!(prompt.contains("do not replace them"));
    }

    #[test]
    fn generator_prompts_wrap_raw_script() {
        assert_eq!(
            testcases_prompt("Write tests.", "page.goto()"),
            "Write tests.\nScript:\npage.goto()\n"
        );
        assert!(refactor_prompt("Refactor.", "page.click()")
            .ends_with("### Here is the code to refactor: page.click()\n"));
    }

    #[test]
    fn chat_prompt_depends_on_context() {
        assert!(chat_prompt("", "why?").starts_with("You are an expert Senior"));
        let with_context = chat_prompt("\n### a.txt\nbody\n", "why?");
        assert!(with_context.starts_with("Use the following context"));
        assert!(with_context.ends_with("Answer the user query:\nwhy?"));
    }
}
