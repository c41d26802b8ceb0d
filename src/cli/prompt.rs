use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{anyhow, Result};

use super::Session;
use crate::error::CommandError;

/// Interactive questions asked while a command runs
pub trait Prompter: Send + Sync {
    /// Whether questions can be answered at all
    fn is_interactive(&self) -> bool;

    fn confirm(&self, message: &str) -> Result<bool>;

    /// Returns the index of the chosen item
    fn select(&self, message: &str, choices: &[String]) -> Result<usize>;
}

/// Prompter reading answers from stdin; questions go to stderr
pub struct ConsolePrompter;

impl ConsolePrompter {
    fn read_line() -> Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl Prompter for ConsolePrompter {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        if !self.is_interactive() {
            return Ok(false);
        }

        eprint!("{} (y/N) ", message);
        io::stderr().flush()?;
        let answer = Self::read_line()?.to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }

    fn select(&self, message: &str, choices: &[String]) -> Result<usize> {
        if !self.is_interactive() {
            return Err(anyhow!("Cannot prompt for a choice without an interactive terminal"));
        }

        eprintln!("{}", message);
        for (i, choice) in choices.iter().enumerate() {
            eprintln!("  {}) {}", i + 1, choice);
        }

        loop {
            eprint!("Enter a number (1-{}): ", choices.len());
            io::stderr().flush()?;
            let line = Self::read_line()?;
            match line.parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => return Ok(n - 1),
                _ => eprintln!("Invalid choice: {}", line),
            }
        }
    }
}

/// `Ok(true)` when the operation may proceed
pub fn confirm_or_force(session: &Session<'_>, force: bool, message: &str) -> Result<bool> {
    if force || !session.confirm {
        return Ok(true);
    }
    session.prompter.confirm(message)
}

/// Pick one of several objects matching a name.
///
/// Candidates are `(id, item)` pairs; duplicate ids collapse onto the first occurrence.
/// Without prompting the command fails listing the ids.
pub fn handle_multiple_results_found<T>(
    session: &Session<'_>,
    message: &str,
    candidates: Vec<(String, T)>,
) -> Result<T> {
    let mut unique: Vec<(String, T)> = Vec::with_capacity(candidates.len());
    for (id, item) in candidates {
        if !unique.iter().any(|(seen, _)| *seen == id) {
            unique.push((id, item));
        }
    }

    if unique.len() == 1 {
        return Ok(unique.remove(0).1);
    }

    if session.prompt && session.prompter.is_interactive() {
        let ids: Vec<String> = unique.iter().map(|(id, _)| id.clone()).collect();
        let index = session
            .prompter
            .select(&format!("{} Please choose one:", message), &ids)?;
        if index < unique.len() {
            return Ok(unique.swap_remove(index).1);
        }
        return Err(anyhow!("Invalid choice: {}", index + 1));
    }

    Err(CommandError::MultipleFound {
        message: message.to_string(),
        ids: unique.into_iter().map(|(id, _)| id).collect(),
    }
    .into())
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Prompter answering from a script and recording the questions
    pub struct ScriptedPrompter {
        pub interactive: bool,
        pub answer: bool,
        pub selection: usize,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompter {
        /// Non-interactive: confirmations are declined, selections fail
        pub fn silent() -> Self {
            Self {
                interactive: false,
                answer: false,
                selection: 0,
                asked: Mutex::new(Vec::new()),
            }
        }

        pub fn answering(answer: bool) -> Self {
            Self {
                interactive: true,
                answer,
                ..Self::silent()
            }
        }

        pub fn selecting(selection: usize) -> Self {
            Self {
                interactive: true,
                answer: true,
                selection,
                ..Self::silent()
            }
        }

        pub fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        fn confirm(&self, message: &str) -> Result<bool> {
            self.asked.lock().unwrap().push(message.to_string());
            Ok(self.interactive && self.answer)
        }

        fn select(&self, message: &str, _choices: &[String]) -> Result<usize> {
            self.asked.lock().unwrap().push(message.to_string());
            if !self.interactive {
                return Err(anyhow!("not interactive"));
            }
            Ok(self.selection)
        }
    }
}
