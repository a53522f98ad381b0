use super::*;

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["opmon-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Migrate)));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["opmon-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn tasks_defaults_to_active_status() {
    let cli = Cli::try_parse_from(["opmon-cli", "tasks"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Tasks {
            user: None,
            status: TaskStatus::Active,
            limit: 50
        })
    ));
}

#[test]
fn tasks_accepts_user_and_status() {
    let cli =
        Cli::try_parse_from(["opmon-cli", "tasks", "--user", "4", "--status", "paused"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Tasks {
            user: Some(4),
            status: TaskStatus::Paused,
            ..
        })
    ));
}

#[test]
fn tasks_rejects_unknown_status() {
    assert!(Cli::try_parse_from(["opmon-cli", "tasks", "--status", "archived"]).is_err());
}

#[test]
fn collect_requires_task() {
    assert!(Cli::try_parse_from(["opmon-cli", "collect"]).is_err());
    let cli = Cli::try_parse_from(["opmon-cli", "collect", "--task", "12"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Collect { task: 12 })));
}

#[test]
fn analyze_limit_is_optional() {
    let cli = Cli::try_parse_from(["opmon-cli", "analyze", "--task", "3"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Analyze {
            task: 3,
            limit: None
        })
    ));
}

#[test]
fn recompute_parses_dates() {
    let cli = Cli::try_parse_from([
        "opmon-cli",
        "recompute",
        "--task",
        "1",
        "--start",
        "2026-03-01",
        "--end",
        "2026-03-07",
    ])
    .unwrap();
    let Some(Commands::Recompute { task, start, end }) = cli.command else {
        panic!("expected recompute command");
    };
    assert_eq!(task, 1);
    assert_eq!(start, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
}

#[test]
fn recompute_rejects_malformed_date() {
    assert!(Cli::try_parse_from([
        "opmon-cli",
        "recompute",
        "--task",
        "1",
        "--start",
        "03/01/2026",
        "--end",
        "2026-03-07",
    ])
    .is_err());
}

#[test]
fn stats_defaults_to_seven_days() {
    let cli = Cli::try_parse_from(["opmon-cli", "stats", "--task", "9"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Stats { task: 9, days: 7 })
    ));
}
