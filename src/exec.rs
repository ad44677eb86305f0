//! Narrow interface to the remote code-execution collaborator (Judge0).
//!
//! This is deliberately outside the room synchronization core: nothing here
//! touches room state, and nothing in the coordinator calls it. Execution
//! requests are synchronous submissions (`wait=true`) whose result is
//! folded into a single user-facing `output` string — an unsupported
//! language or a transport failure produces a message, never an error the
//! caller has to unwrap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default Judge0 CE endpoint: one-shot submission, plain-text payloads.
pub const DEFAULT_ENDPOINT: &str =
    "https://ce.judge0.com/submissions?base64_encoded=false&wait=true";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Languages the execution collaborator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Javascript,
    Python,
    Cpp,
    C,
    Java,
}

impl Language {
    /// Parse a client-supplied language name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "javascript" => Some(Self::Javascript),
            "python" => Some(Self::Python),
            "cpp" => Some(Self::Cpp),
            "c" => Some(Self::C),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// The Judge0 language id this maps to.
    pub fn judge0_id(self) -> u32 {
        match self {
            Self::Javascript => 63, // Node.js 12.x
            Self::Python => 71,     // Python 3
            Self::Cpp => 54,        // C++ (GCC 9.2.0)
            Self::C => 50,          // C (GCC 9.2.0)
            Self::Java => 62,       // Java (OpenJDK 13)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Java => "java",
        }
    }
}

/// Result of an execution request, always user-displayable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Submission {
    source_code: String,
    language_id: u32,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionResult {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
}

impl SubmissionResult {
    /// First non-empty field, in the collaborator's precedence order.
    fn into_output(self) -> String {
        [self.stdout, self.stderr, self.compile_output, self.message]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| "No output".to_string())
    }
}

/// HTTP client for the Judge0 execution collaborator.
pub struct Judge0Client {
    http: reqwest::Client,
    endpoint: String,
}

impl Judge0Client {
    /// Create a client against the public Judge0 CE endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a client against a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Run `code` under `language` and fold the result into an outcome.
    pub async fn run(&self, language: &str, code: &str) -> ExecOutcome {
        let Some(language) = Language::parse(language) else {
            return ExecOutcome {
                output: format!("Language {language} not supported."),
            };
        };

        match self.submit(language, code).await {
            Ok(output) => ExecOutcome { output },
            Err(e) => {
                log::error!("Execution failed: {e}");
                ExecOutcome {
                    output: format!("Execution failed: {e}"),
                }
            }
        }
    }

    async fn submit(&self, language: Language, code: &str) -> Result<String, reqwest::Error> {
        let submission = Submission {
            source_code: code.to_string(),
            language_id: language.judge0_id(),
        };

        let result: SubmissionResult = self
            .http
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&submission)
            .send()
            .await?
            .json()
            .await?;

        Ok(result.into_output())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for Judge0Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!(Language::parse("python"), Some(Language::Python));
        assert_eq!(Language::parse("cpp"), Some(Language::Cpp));
        assert_eq!(Language::parse("rust"), None);
        assert_eq!(Language::parse(""), None);
        // Case sensitive, matching the collaborator's contract.
        assert_eq!(Language::parse("Python"), None);
    }

    #[test]
    fn test_judge0_ids() {
        assert_eq!(Language::Javascript.judge0_id(), 63);
        assert_eq!(Language::Python.judge0_id(), 71);
        assert_eq!(Language::Cpp.judge0_id(), 54);
        assert_eq!(Language::C.judge0_id(), 50);
        assert_eq!(Language::Java.judge0_id(), 62);
    }

    #[test]
    fn test_name_parse_roundtrip() {
        for lang in [
            Language::Javascript,
            Language::Python,
            Language::Cpp,
            Language::C,
            Language::Java,
        ] {
            assert_eq!(Language::parse(lang.name()), Some(lang));
        }
    }

    #[tokio::test]
    async fn test_unsupported_language_outcome() {
        let client = Judge0Client::new();
        let outcome = client.run("rust", "fn main() {}").await;
        assert_eq!(outcome.output, "Language rust not supported.");
    }

    #[test]
    fn test_result_output_precedence() {
        let result = SubmissionResult {
            stdout: Some("out".to_string()),
            stderr: Some("err".to_string()),
            ..Default::default()
        };
        assert_eq!(result.into_output(), "out");

        // Empty strings fall through, like the collaborator's truthiness rules.
        let result = SubmissionResult {
            stdout: Some(String::new()),
            stderr: Some("err".to_string()),
            ..Default::default()
        };
        assert_eq!(result.into_output(), "err");

        let result = SubmissionResult {
            compile_output: Some("warning: x".to_string()),
            ..Default::default()
        };
        assert_eq!(result.into_output(), "warning: x");

        assert_eq!(SubmissionResult::default().into_output(), "No output");
    }

    #[test]
    fn test_custom_endpoint() {
        let client = Judge0Client::with_endpoint("http://localhost:2358/submissions");
        assert_eq!(client.endpoint(), "http://localhost:2358/submissions");
    }
}
