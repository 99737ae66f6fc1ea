// CLI commands for validating problem candidates
use anyhow::{Context, Result};
use gavel_common::{
    JudgeConfig, LanguageRegistry, LanguageSolution, ProblemCandidate, TestCase, Verdict,
};
use gavel_engine::{
    AcceptReport, JsonDirSink, Rejection, ValidationError, ValidationOptions, ValidationOutcome,
    Validator,
};
use std::fs;
use std::path::Path;
use tracing::info;

pub const EXIT_ACCEPT: i32 = 0;
pub const EXIT_REJECT: i32 = 1;
pub const EXIT_RUN_FAILURE: i32 = 2;

/// Judge settings from the environment, with the command-line URL taking precedence
fn load_config(judge_url: Option<&str>) -> Result<JudgeConfig> {
    let config = JudgeConfig::from_env().context("Invalid judge configuration")?;
    let config = apply_judge_url(config, judge_url);
    config.validate().context("Invalid --judge-url")?;
    Ok(config)
}

fn apply_judge_url(mut config: JudgeConfig, judge_url: Option<&str>) -> JudgeConfig {
    if let Some(url) = judge_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    config
}

fn load_registry(path: Option<&Path>) -> Result<LanguageRegistry> {
    match path {
        Some(path) => LanguageRegistry::load(path)
            .with_context(|| format!("Failed to load language table {}", path.display())),
        None => Ok(LanguageRegistry::builtin()),
    }
}

fn load_candidate(path: &Path) -> Result<ProblemCandidate> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidate {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse candidate {}", path.display()))
}

fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test cases {}", path.display()))
}

pub fn exit_code(outcome: &ValidationOutcome) -> i32 {
    match outcome {
        ValidationOutcome::Accept(_) => EXIT_ACCEPT,
        ValidationOutcome::Reject(_) => EXIT_REJECT,
    }
}

/// Validate a candidate file and print the decision
pub async fn validate(
    candidate_path: &Path,
    options: ValidationOptions,
    store: Option<&Path>,
    languages: Option<&Path>,
    judge_url: Option<&str>,
    json: bool,
) -> Result<i32> {
    let config = load_config(judge_url)?;
    let registry = load_registry(languages)?;
    let candidate = load_candidate(candidate_path)?;
    let validator = Validator::connect(&config, registry).context("Failed to create judge client")?;

    if !json {
        println!("⚖️  Validating '{}' against {}", candidate.title, config.base_url);
        println!(
            "   {} test cases × {} languages ({:?}, {:?})",
            candidate.test_cases.len(),
            candidate.reference_solutions.len(),
            options.mode,
            options.policy
        );
    }

    let result = match store {
        Some(dir) => {
            let sink = JsonDirSink::new(dir);
            validator.validate_and_store(&candidate, options, &sink).await
        }
        None => validator.validate_candidate(&candidate, options).await,
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => return Ok(report_failure(&e, json)),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
        if let (Some(dir), ValidationOutcome::Accept(_)) = (store, &outcome) {
            println!("💾 Stored in {}", dir.display());
        }
    }

    info!(run_id = %outcome.run_id(), accepted = outcome.is_accepted(), "Validation finished");
    Ok(exit_code(&outcome))
}

/// Grade one source file as a single-language candidate
pub async fn run_source(
    language: &str,
    source_path: &Path,
    cases_path: &Path,
    languages: Option<&Path>,
    judge_url: Option<&str>,
) -> Result<i32> {
    let config = load_config(judge_url)?;
    let registry = load_registry(languages)?;
    let source_code = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read source {}", source_path.display()))?;
    let test_cases = load_test_cases(cases_path)?;

    let title = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    let candidate = ProblemCandidate::new(
        title,
        test_cases,
        vec![LanguageSolution::new(language, source_code)],
    );

    println!(
        "🚀 Running {} against {} test cases",
        source_path.display(),
        candidate.test_cases.len()
    );

    let validator = Validator::connect(&config, registry).context("Failed to create judge client")?;
    match validator
        .validate_candidate(&candidate, ValidationOptions::default())
        .await
    {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(exit_code(&outcome))
        }
        Err(e) => Ok(report_failure(&e, false)),
    }
}

/// Print the registry in table order
pub fn list_languages(languages: Option<&Path>) -> Result<()> {
    let registry = load_registry(languages)?;

    println!("📋 Supported languages:");
    for (name, id) in registry.list() {
        println!("  {:<12} {}", name, id);
    }
    Ok(())
}

fn report_failure(error: &ValidationError, json: bool) -> i32 {
    if json {
        let body = serde_json::json!({
            "decision": "error",
            "language": error.language(),
            "error": error.to_string(),
            "failures": error.failures(),
        });
        println!("{}", body);
    } else {
        println!("💥 Validation could not complete: {}", error);
        for verdict in error.failures() {
            print_failure(verdict);
        }
    }
    EXIT_RUN_FAILURE
}

fn print_outcome(outcome: &ValidationOutcome) {
    match outcome {
        ValidationOutcome::Accept(report) => print_accept(report),
        ValidationOutcome::Reject(rejection) => print_rejection(rejection),
    }
}

fn print_accept(report: &AcceptReport) {
    println!("\n✅ Candidate accepted: {}", report.title);
    println!("   Run:         {}", report.run_id);
    println!("   Languages:   {}", report.languages.join(", "));
    println!(
        "   Test cases:  {} ({} submissions)",
        report.test_cases, report.submissions
    );
    println!(
        "   Duration:    {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

fn print_rejection(rejection: &Rejection) {
    println!("\n❌ Candidate rejected: {}", rejection.title);
    println!("   Run:         {}", rejection.run_id);
    if !rejection.passed_languages.is_empty() {
        println!("   Passed:      {}", rejection.passed_languages.join(", "));
    }
    for verdict in &rejection.failures {
        print_failure(verdict);
    }
}

fn print_failure(verdict: &Verdict) {
    println!("\n   ✗ {}", verdict);
    let Some(diag) = &verdict.diagnostics else {
        return;
    };

    print_field("Input", Some(&diag.input));
    print_field("Expected", Some(&diag.expected_output));
    print_field("Actual", diag.actual_stdout.as_deref());
    print_field("Stderr", diag.stderr.as_deref());
    print_field("Compile output", diag.compile_output.as_deref());
    print_field("Message", diag.message.as_deref());
    if let Some(time) = diag.time {
        println!("     Time:     {:.3}s", time);
    }
    if let Some(memory) = diag.memory {
        println!("     Memory:   {} KB", memory);
    }
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        println!("     {}:", label);
        println!("{}", indent(value, 8));
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.trim_end_matches('\n')
        .lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}
