use snapdb::config::{DbConfig, RecoveryMode};
use snapdb::offline;
use std::path::Path;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "inspect" => cmd_inspect(&args[2..]),
        "check" => cmd_check(&args[2..]),
        other => {
            print_usage();
            Err(format!("unknown command: {other}"))
        }
    }
}

fn cmd_inspect(args: &[String]) -> Result<(), String> {
    let log = parse_flag_value(args, "--log").ok_or("--log is required")?;
    let config = parse_config(args);
    let report = offline::inspect_log(Path::new(&log), &config)
        .map_err(|e| format!("inspect {log}: {e}"))?;
    print_json(&report)?;
    match report.error {
        Some(err) => Err(format!("log is torn: {err}")),
        None => Ok(()),
    }
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    let dir = parse_flag_value(args, "--dir").ok_or("--dir is required")?;
    let name = parse_flag_value(args, "--name").ok_or("--name is required")?;
    let config = parse_config(args);
    let report = offline::check_invariants(Path::new(&dir), &name, &config)
        .map_err(|e| format!("check {name}: {e}"))?;
    print_json(&report)?;
    if report.ok {
        Ok(())
    } else {
        Err("invariant violations found".into())
    }
}

fn print_json<T: serde::Serialize>(report: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(report).map_err(|e| format!("encode report: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1).cloned())
}

fn parse_config(args: &[String]) -> DbConfig {
    let mut cfg = DbConfig::default();
    if args.iter().any(|a| a == "--permissive") {
        cfg.recovery_mode = RecoveryMode::Permissive;
    }
    cfg
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  snapdb inspect --log <file.sdblog>");
    eprintln!("  snapdb check --dir <data-dir> --name <database> [--permissive]");
}
