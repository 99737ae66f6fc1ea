pub mod config;
pub mod languages;
pub mod types;

pub use config::{ConfigError, JudgeConfig};
pub use languages::{LanguageError, LanguageId, LanguageRegistry};
pub use types::{
    Diagnostics, JudgeResult, JudgeStatus, LanguageSolution, ProblemCandidate, RuntimeSignal,
    TestCase, Token, Verdict,
};
