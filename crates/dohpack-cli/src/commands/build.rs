//! `dohpack build` and `dohpack bake`.

use dohpack_core::version::SCHEMA_VERSION;
use dohpack_core::{run_build, BakeStatus, BuildOptions, BuildReport, Config, Error, Problem};
use miette::Result;
use serde::Serialize;

#[derive(Serialize)]
struct BuildJson<'a> {
    schema_version: u32,
    ok: bool,
    #[serde(flatten)]
    report: &'a BuildReport,
}

#[derive(Serialize)]
struct ErrorJson<'a> {
    code: &'a str,
    message: String,
}

#[derive(Serialize)]
struct BuildErrorJson<'a> {
    schema_version: u32,
    ok: bool,
    error: ErrorJson<'a>,
    #[serde(skip_serializing_if = "no_names")]
    cycle: &'a [String],
    problems: &'a [Problem],
}

fn no_names(names: &&[String]) -> bool {
    names.is_empty()
}

/// Run one build and print its report.
pub fn run(config: &Config, bake: bool, strict: bool, json: bool) -> Result<()> {
    let options = BuildOptions { bake, strict };
    match run_build(config, options) {
        Ok(report) => {
            print_report(&report, json);
            if report.bakes.iter().any(|b| b.status == BakeStatus::Failed) {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            print_error(&e, json);
            std::process::exit(1);
        }
    }
}

pub fn print_report(report: &BuildReport, json: bool) {
    if json {
        let out = BuildJson {
            schema_version: SCHEMA_VERSION,
            ok: true,
            report,
        };
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error: cannot serialize report: {e}"),
        }
        return;
    }

    println!(
        "scanned {} files ({} parsed, {} cached) in {}ms",
        report.files_scanned, report.files_parsed, report.files_cached, report.duration_ms
    );
    println!(
        "  {} packages, {} modules, {} patterns, {} manifests",
        report.packages, report.modules, report.patterns, report.manifests_written
    );

    if !report.problems.is_empty() {
        println!("  {} problems:", report.problems.len());
        for problem in &report.problems {
            println!("    {problem}");
        }
    }
    if !report.deprecations.is_empty() {
        println!("  {} deprecations:", report.deprecations.len());
        for d in &report.deprecations {
            println!(
                "    {} is deprecated, use {} ({}:{})",
                d.feature, d.replacement, d.file, d.line
            );
        }
    }

    if report.bakes.is_empty() {
        return;
    }
    println!();
    let (mut baked, mut unchanged, mut failed) = (0, 0, 0);
    for outcome in &report.bakes {
        let names = outcome.names.join(", ");
        match outcome.status {
            BakeStatus::Baked => baked += 1,
            BakeStatus::Unchanged => unchanged += 1,
            BakeStatus::Failed => failed += 1,
        }
        match (&outcome.version, &outcome.message) {
            (_, Some(message)) => {
                println!("{} {names}: {message}", outcome.status.as_str());
            }
            (Some(version), None) => println!("{} {names} {version}", outcome.status.as_str()),
            (None, None) => println!("{} {names}", outcome.status.as_str()),
        }
    }
    println!("bake: {baked} baked, {unchanged} unchanged, {failed} failed");
    for orphan in &report.orphans {
        println!("orphaned dohball: {orphan}");
    }
}

pub fn print_error(err: &Error, json: bool) {
    let (cycle, problems): (&[String], &[Problem]) = match err {
        Error::Cycle { names, problems } => (names.as_slice(), problems.as_slice()),
        _ => (&[][..], &[][..]),
    };

    if json {
        let out = BuildErrorJson {
            schema_version: SCHEMA_VERSION,
            ok: false,
            error: ErrorJson {
                code: err.code(),
                message: err.to_string(),
            },
            cycle,
            problems,
        };
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error: cannot serialize error: {e}"),
        }
        return;
    }

    eprintln!("error: {err}");
    for name in cycle {
        eprintln!("  in cycle: {name}");
    }
    for problem in problems {
        eprintln!("  {problem}");
    }
}
