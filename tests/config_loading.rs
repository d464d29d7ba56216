use std::io::Write;

use evoforge_core::config::{ForgeConfig, Termination};
use evoforge_core::error::ForgeError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[cycle]
population_size = 8
ecosystem_seed_count = 2
n_best = 1
replacement_ratio = 0.25
tournament_size_ratio = 0.5
architect_budget_ratio = 0.2
genetic_operator_budget_ratio = 0.1
node_types = ["StartNode", "EndNode", "LLMNode", "RoutingNode"]
snapshot_dir = "/tmp/evoforge-snapshots"
seed = 7

[cycle.termination]
mode = "generations"
generations = 4
budget = 2.5

[gate]
calls_per_minute = 60

[retry]
max_retries = 3
initial_backoff_ms = 200
max_backoff_ms = 5000
request_timeout_secs = 30

[engine]
max_steps = 20
routing_attempts = 2
"#,
    );

    let config = ForgeConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.cycle.population_size, 8);
    assert_eq!(config.cycle.ecosystem_seed_count, 2);
    assert_eq!(config.cycle.n_best, 1);
    assert_eq!(config.cycle.replacement_ratio, 0.25);
    assert_eq!(config.cycle.node_types.len(), 4);
    assert_eq!(config.cycle.seed, Some(7));
    assert_eq!(
        config.cycle.termination,
        Termination::Generations {
            generations: 4,
            budget: Some(2.5)
        }
    );
    assert_eq!(config.cycle.termination.budget(), Some(2.5));
    assert_eq!(config.gate.calls_per_minute, 60);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.request_timeout_secs, 30);
    assert_eq!(config.engine.max_steps, 20);
    assert_eq!(config.engine.routing_attempts, 2);
}

#[test]
fn test_empty_file_uses_defaults() {
    let tmp = write_config("");
    let config = ForgeConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.cycle.population_size, 10);
    assert_eq!(config.cycle.ecosystem_seed_count, 5);
    assert_eq!(config.cycle.n_best, 3);
    assert_eq!(config.cycle.replacement_ratio, 0.5);
    assert_eq!(config.cycle.tournament_size_ratio, 0.1);
    assert_eq!(config.cycle.termination.budget(), Some(1.0));
    assert!(config.cycle.snapshot_dir.is_none());
    assert_eq!(config.gate.calls_per_minute, 500);
    assert_eq!(config.retry.max_retries, 10);
    assert_eq!(config.retry.initial_backoff_ms, 1000);
    assert_eq!(config.retry.max_backoff_ms, 60000);
    assert_eq!(config.engine.max_steps, 50);
}

#[test]
fn test_budget_mode_with_generation_cap() {
    let tmp = write_config(
        r#"
[cycle.termination]
mode = "budget"
budget = 0.75
max_generations = 3
"#,
    );
    let config = ForgeConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.cycle.termination,
        Termination::Budget {
            budget: 0.75,
            max_generations: Some(3)
        }
    );
}

#[test]
fn test_env_var_expansion() {
    std::env::set_var("EVOFORGE_TEST_POPULATION", "6");
    let tmp = write_config(
        r#"
[cycle]
population_size = ${EVOFORGE_TEST_POPULATION}
"#,
    );
    let config = ForgeConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.cycle.population_size, 6);
}

#[test]
fn test_unset_env_var_is_left_in_place() {
    std::env::remove_var("EVOFORGE_TEST_UNSET_DIR");
    let tmp = write_config(
        r#"
[cycle]
snapshot_dir = "${EVOFORGE_TEST_UNSET_DIR}/snapshots"
"#,
    );
    let config = ForgeConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.cycle.snapshot_dir,
        Some(std::path::PathBuf::from("${EVOFORGE_TEST_UNSET_DIR}/snapshots"))
    );
}

#[test]
fn test_missing_file_is_not_found() {
    let err = ForgeConfig::load(std::path::Path::new("/nonexistent/evoforge.toml")).unwrap_err();
    assert!(matches!(err, ForgeError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_values_are_rejected() {
    for content in [
        "[cycle]\npopulation_size = 0\n",
        "[cycle]\nreplacement_ratio = 1.5\n",
        "[cycle]\ntournament_size_ratio = 0.0\n",
        "[cycle.termination]\nmode = \"budget\"\nbudget = -1.0\n",
        "[cycle.termination]\nmode = \"generations\"\ngenerations = 0\n",
        "[gate]\ncalls_per_minute = 0\n",
    ] {
        let tmp = write_config(content);
        let err = ForgeConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)), "accepted: {}", content);
    }
}

#[test]
fn test_malformed_toml_is_config_error() {
    let tmp = write_config("[cycle\npopulation_size = 3");
    let err = ForgeConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, ForgeError::Config(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = ForgeConfig::default();
    let text = toml::to_string_pretty(&config).expect("serialize");
    let tmp = write_config(&text);
    let loaded = ForgeConfig::load(tmp.path()).expect("reload");
    assert_eq!(loaded.cycle.termination, config.cycle.termination);
    assert_eq!(loaded.cycle.population_size, config.cycle.population_size);
}
