use std::io::{self, BufRead, Write};

/// Operator interaction during install.
pub trait Prompt {
    /// Yes/no question. Quiet implementations return `default`.
    fn confirm(&self, message: &str, default: bool) -> bool;

    /// Free-form answer; `None` when no answer can be obtained.
    fn ask(&self, message: &str) -> Option<String>;

    /// Informational line shown alongside a question.
    fn notify(&self, message: &str);
}

/// Reads answers from stdin; in quiet mode assumes every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    quiet: bool,
}

impl TerminalPrompt {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn read_line(&self, message: &str) -> Option<String> {
        print!("{message}");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str, default: bool) -> bool {
        if self.quiet {
            return default;
        }
        let hint = if default { "(Y/n)" } else { "(y/N)" };
        match self.read_line(&format!("{message} {hint}: ")) {
            Some(answer) => parse_answer(&answer, default),
            None => default,
        }
    }

    fn ask(&self, message: &str) -> Option<String> {
        if self.quiet {
            return None;
        }
        self.read_line(message)
    }

    fn notify(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }
}

/// Empty answer keeps the default; anything other than `y`/`yes` is a no.
fn parse_answer(answer: &str, default: bool) -> bool {
    let answer = answer.trim();
    if answer.is_empty() {
        return default;
    }
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}
