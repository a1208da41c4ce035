use crate::dataset::Example;

pub const DEFAULT_PREAMBLE: &str = r#"
Solve multi-step arithmetic problems.

Q: ((-5 + 9 * -4 - 0) * (4 + -7 + 0 * -5)) =
A: Let's think step by step.
Let’s recall that the order of operations in mathematics is as follows: (1) Parentheses, (2) exponents, (3) multiplication and division (from left to right), (4) addition and multiplication (from left to right). So, remember to always compute the expressions inside parentheses or brackets first.
This equation can be written as "A * B", where A = (-5 + 9 * -4 - 0) and B = (4 + -7 + 0 * -5).
Let's calculate A = (-5 + 9 * -4 - 0) = (-5 + (9 * -4) - 0) = (-5 + (-36) - 0) = (-5 + -36 - 0) = -5 - 36 = -41.
Let's calculate B = (4 + -7 + 0 * -5) = (4 + -7 + (0 * -5)) = (4 + -7 + 0) = (4 + -7) = (4 - 7) = -3.
Then, the final equation is A * B = -41 * -3 = (-61) * (-3) = 123. So the answer is 123.
"#;

/// Few-shot prompt: trimmed preamble, blank line, `Q:<input>`, `A:`.
pub fn build_prompt(preamble: &str, example: &Example) -> String {
    PromptBuilder::new(preamble).build(example)
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    preamble: String,
    limit_hint: Option<usize>,
}

impl PromptBuilder {
    pub fn new(preamble: impl AsRef<str>) -> Self {
        Self {
            preamble: preamble.as_ref().trim().to_string(),
            limit_hint: None,
        }
    }

    /// Ask the model to keep its answer under `chars` characters.
    pub fn limit_hint(mut self, chars: usize) -> Self {
        self.limit_hint = Some(chars);
        self
    }

    pub fn build(&self, example: &Example) -> String {
        let mut prompt = format!("{}\n\nQ:{}\nA:", self.preamble, example.input);
        if let Some(chars) = self.limit_hint {
            prompt.push_str(&format!(" (Limit output to {} characters)", group_thousands(chars)));
        }
        prompt
    }
}

fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
