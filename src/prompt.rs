//! Interactive commit classification.
//!
//! All questions are asked in one session. Answers are reported through a
//! callback as soon as each one is given, then returned together.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::changes::{ChangeType, IGNORE};
use crate::error::{Error, Result};
use crate::progress::Progress;

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Value returned when selected.
    pub value: String,
    /// Text shown in the list.
    pub label: String,
}

/// A single-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub message: String,
    pub choices: Vec<Choice>,
}

/// Callback receiving `(question index, answer)`.
pub type OnAnswer<'a> = &'a (dyn Fn(usize, &str) + Send + Sync);

/// Asks the user to pick answers.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Asks every question in order and returns one answer per question.
    async fn ask(&self, questions: &[Question], on_answer: OnAnswer<'_>) -> Result<Vec<String>>;
}

/// Choices for classifying a commit: every category, then ignore.
pub fn type_choices(types: &[ChangeType]) -> Vec<Choice> {
    types
        .iter()
        .map(|t| Choice {
            value: t.handle.clone(),
            label: if t.description.is_empty() {
                t.name.clone()
            } else {
                format!("{} ({})", t.name, t.description)
            },
        })
        .chain(std::iter::once(Choice {
            value: IGNORE.to_string(),
            label: "Ignore".to_string(),
        }))
        .collect()
}

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

/// [`Prompter`] reading numbered answers from a line-based input.
pub struct TerminalPrompter {
    input: Mutex<Input>,
    progress: Progress,
}

impl TerminalPrompter {
    /// Reads answers from stdin.
    pub fn stdin(progress: Progress) -> Self {
        Self::with_input(BufReader::new(tokio::io::stdin()), progress)
    }

    pub fn with_input(input: impl AsyncBufRead + Unpin + Send + 'static, progress: Progress) -> Self {
        Self {
            input: Mutex::new(Box::new(input)),
            progress,
        }
    }

    fn resolve<'q>(question: &'q Question, answer: &str) -> Option<&'q Choice> {
        let answer = answer.trim();
        if let Ok(n) = answer.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| question.choices.get(i));
        }
        question
            .choices
            .iter()
            .find(|choice| choice.value.eq_ignore_ascii_case(answer))
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask(&self, questions: &[Question], on_answer: OnAnswer<'_>) -> Result<Vec<String>> {
        let mut input = self.input.lock().await;
        let mut answers = Vec::with_capacity(questions.len());

        for (index, question) in questions.iter().enumerate() {
            self.progress.log(format!("? {}", question.message));
            for (n, choice) in question.choices.iter().enumerate() {
                self.progress.log(format!("  {}) {}", n + 1, choice.label));
            }

            let choice = loop {
                let mut line = String::new();
                let read = input
                    .read_line(&mut line)
                    .await
                    .map_err(|e| Error::Prompt(e.to_string()))?;
                if read == 0 {
                    return Err(Error::Prompt(
                        "input closed before every commit was classified".to_string(),
                    ));
                }
                match Self::resolve(question, &line) {
                    Some(choice) => break choice,
                    None => {
                        self.progress.warn(format!(
                            "Pick a number between 1 and {}",
                            question.choices.len()
                        ));
                    }
                }
            };

            on_answer(index, &choice.value);
            answers.push(choice.value.clone());
        }

        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::changes::default_change_types;

    fn question(message: &str) -> Question {
        Question {
            message: message.to_string(),
            choices: type_choices(&default_change_types()),
        }
    }

    #[test]
    fn ignore_is_always_last() {
        let choices = type_choices(&default_change_types());
        let values: Vec<_> = choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, ["major", "minor", "patch", "ignore"]);
        assert_eq!(choices[0].label, "Major Change (incompatible API change)");
    }

    #[tokio::test]
    async fn answers_are_reported_incrementally() {
        let (progress, output) = Progress::buffered();
        let prompter = TerminalPrompter::with_input(&b"2\npatch\n4\n"[..], progress);
        let seen = StdMutex::new(Vec::new());

        let answers = prompter
            .ask(
                &[question("Add a"), question("Fix b"), question("Chore c")],
                &|index, answer| seen.lock().unwrap().push((index, answer.to_string())),
            )
            .await
            .unwrap();

        assert_eq!(answers, ["minor", "patch", "ignore"]);
        assert_eq!(
            *seen.lock().unwrap(),
            [
                (0, "minor".to_string()),
                (1, "patch".to_string()),
                (2, "ignore".to_string())
            ]
        );
        assert!(output.contents().contains("? Fix b"));
    }

    #[tokio::test]
    async fn invalid_answers_are_asked_again() {
        let (progress, output) = Progress::buffered();
        let prompter = TerminalPrompter::with_input(&b"9\nnope\n1\n"[..], progress);

        let answers = prompter.ask(&[question("Add a")], &|_, _| {}).await.unwrap();

        assert_eq!(answers, ["major"]);
        assert_eq!(output.contents().matches("Pick a number").count(), 2);
    }

    #[tokio::test]
    async fn closed_input_is_an_error() {
        let (progress, _) = Progress::buffered();
        let prompter = TerminalPrompter::with_input(&b"1\n"[..], progress);

        let err = prompter
            .ask(&[question("a"), question("b")], &|_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Prompt(_)));
    }
}
