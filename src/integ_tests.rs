//! Integration tests for the runner, group runner and test sets
//!
//! These tests write real configuration files and compose templates into a
//! temporary directory and run them end to end against a scripted executor.

#[cfg(test)]
mod tests {
    use crate::{
        compose::testing::ScriptedExecutor,
        output::OutputFormat,
        runner::{RunArgsBuilder, RunResult, prepare_output_dir, run_tests},
    };
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    // ============ Test Helpers ============

    /// Helper to write a configuration file next to a compose template
    fn write_config(dir: &TempDir, config: &str) -> PathBuf {
        std::fs::write(
            dir.path().join("compose.tmpl"),
            "services:\n  test-service:\n    image: ${IMAGE}\n",
        )
        .unwrap();
        let path = dir.path().join("intmaniac.yaml");
        std::fs::write(&path, config).unwrap();
        path
    }

    /// Helper to run a configuration with the given executor
    async fn run(
        dir: &TempDir,
        config: &str,
        env: &[&str],
        executor: Arc<ScriptedExecutor>,
    ) -> anyhow::Result<RunResult> {
        let config_file = write_config(dir, config);
        let output_dir = prepare_output_dir(Some(dir.path().join("out"))).await?;
        let args = RunArgsBuilder::default()
            .config_file(config_file)
            .env(env.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .output_dir(output_dir)
            .quiet(true)
            .executor(executor)
            .build()?;
        run_tests(args).await
    }

    fn protocol(result: &RunResult) -> String {
        let mut out = Vec::new();
        result.write_protocol(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn report_names(result: &RunResult) -> Vec<String> {
        result
            .outcome
            .as_ref()
            .unwrap()
            .reports
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    const GROUPS_CONFIG: &str = "\
global:
  meta:
    docker_compose_template: compose.tmpl
  environment:
    IMAGE: app
testsets:
  - build:
      compile: {meta: {test_commands: make}}
  - web:
      smoke: {meta: {test_commands: web-smoke}}
    api:
      _global:
        environment: {IMAGE: api}
      smoke: {meta: {test_commands: api-smoke}}
";

    // ============ Group Tests ============

    #[tokio::test]
    async fn test_groups_run_in_order_and_succeed() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let result = run(&dir, GROUPS_CONFIG, &[], executor.clone())
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(report_names(&result), vec!["00-build", "01-api", "01-web"]);

        // The build group finished before anything of the second group started
        let calls = executor.invocations();
        let make_call = calls
            .iter()
            .position(|c| c.args.contains(&"make".to_string()))
            .unwrap();
        let first_second_group = calls
            .iter()
            .position(|c| c.args.iter().any(|a| a.ends_with("-smoke")))
            .unwrap();
        assert!(make_call < first_second_group);

        let api = std::fs::read_to_string(dir.path().join("out/01-api/smoke/docker-compose.yml"))
            .unwrap();
        assert!(api.contains("image: api"));
        let web = std::fs::read_to_string(dir.path().join("out/01-web/smoke/docker-compose.yml"))
            .unwrap();
        assert!(web.contains("image: app"));
    }

    #[tokio::test]
    async fn test_failed_group_skips_following_groups() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new().failing("make"));

        let result = run(&dir, GROUPS_CONFIG, &[], executor.clone())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(report_names(&result), vec!["00-build"]);
        assert_eq!(
            result.outcome.as_ref().unwrap().skipped,
            vec!["01-api", "01-web"]
        );
        assert!(
            executor
                .invocations()
                .iter()
                .all(|c| !c.args.iter().any(|a| a.ends_with("-smoke")))
        );
        assert!(!dir.path().join("out/01-api").exists());
    }

    #[tokio::test]
    async fn test_failed_set_does_not_stop_its_own_group() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new().failing("api-smoke"));

        let result = run(&dir, GROUPS_CONFIG, &[], executor).await.unwrap();

        assert!(!result.succeeded);
        let outcome = result.outcome.as_ref().unwrap();
        assert_eq!(outcome.reports.len(), 3);
        assert!(!outcome.reports[1].succeeded());
        assert!(outcome.reports[2].succeeded());
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_sets_of_a_group_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let config = "\
global:
  meta: {docker_compose_template: compose.tmpl, test_commands: meet}
testsets:
  one: {t: {}}
  two: {t: {}}
  three: {t: {}}
";
        let executor = Arc::new(ScriptedExecutor::new().rendezvous("meet", 3));

        let result = tokio::time::timeout(Duration::from_secs(10), run(&dir, config, &[], executor))
            .await
            .expect("test sets of a group did not run concurrently")
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(report_names(&result), vec!["one", "three", "two"]);
    }

    // ============ Configuration Tests ============

    #[tokio::test]
    async fn test_command_line_environment_reaches_containers() {
        let dir = TempDir::new().unwrap();
        let config = "\
global:
  meta: {docker_compose_template: compose.tmpl}
  environment: {FOO: file, IMAGE: app}
testsets:
  set:
    t: {environment: {FOO: test}}
";
        let executor = Arc::new(ScriptedExecutor::new());

        run(&dir, config, &["FOO=bar", "EXTRA=a=b"], executor.clone())
            .await
            .unwrap();

        let calls = executor.invocations();
        let args = &calls[0].args;
        assert!(args.windows(2).any(|w| w == ["-e", "FOO=bar"]));
        assert!(args.windows(2).any(|w| w == ["-e", "EXTRA=a=b"]));
        assert_eq!(calls[0].env["FOO"], "bar");
    }

    #[tokio::test]
    async fn test_artifacts_are_written_to_output_dir() {
        let dir = TempDir::new().unwrap();
        let config = "\
global:
  meta: {docker_compose_template: compose.tmpl, test_commands: check}
testsets:
  set:
    t: {}
";
        let executor = Arc::new(ScriptedExecutor::new().with_stdout("check", "42 passed"));

        run(&dir, config, &[], executor).await.unwrap();

        let test_dir = dir.path().join("out/set/t");
        let log = std::fs::read_to_string(test_dir.join("output.log")).unwrap();
        assert!(log.contains("42 passed"));
        let result: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(test_dir.join("result.json")).unwrap())
                .unwrap();
        assert_eq!(result["status"], "success");
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let output_dir = prepare_output_dir(Some(dir.path().join("out"))).await.unwrap();
        let args = RunArgsBuilder::default()
            .config_file(dir.path().join("missing.yaml"))
            .output_dir(output_dir)
            .executor(Arc::new(ScriptedExecutor::new()))
            .build()
            .unwrap();

        let err = run_tests(args).await.unwrap_err();

        assert!(
            err.to_string()
                .starts_with("Could not find configuration file:")
        );
    }

    #[tokio::test]
    async fn test_invalid_environment_setting() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let err = run(&dir, GROUPS_CONFIG, &["NOVALUE"], executor.clone())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid environment setting: NOVALUE");
        assert!(executor.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let dir = TempDir::new().unwrap();
        let config_file = write_config(&dir, GROUPS_CONFIG);
        let executor = Arc::new(ScriptedExecutor::new());
        let args = RunArgsBuilder::default()
            .config_file(config_file)
            .output_dir(dir.path().join("out"))
            .dry_run(true)
            .executor(executor.clone())
            .build()
            .unwrap();

        let result = run_tests(args).await.unwrap();

        assert!(result.succeeded);
        assert!(result.outcome.is_none());
        assert!(executor.invocations().is_empty());

        let mut plan = Vec::new();
        result.write_plan(&mut plan).unwrap();
        let plan = String::from_utf8(plan).unwrap();
        assert!(plan.contains("Group 1:\n  01-api\n    smoke (service test-service): api-smoke\n"));
    }

    // ============ Protocol Tests ============

    #[tokio::test]
    async fn test_text_protocol() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new().failing("make"));

        let result = run(&dir, GROUPS_CONFIG, &[], executor).await.unwrap();
        let text = protocol(&result);

        assert_eq!(result.output_format, OutputFormat::Text);
        assert!(text.starts_with("TEST PROTOCOL\n=== test set 00-build\n"));
        assert!(text.contains("FAILED: 'docker-compose"));
        assert!(!text.contains("01-api"));
    }

    #[tokio::test]
    async fn test_teamcity_protocol() {
        let dir = TempDir::new().unwrap();
        let config = format!("output_format: teamcity\n{}", GROUPS_CONFIG);
        let executor = Arc::new(ScriptedExecutor::new());

        let result = run(&dir, &config, &[], executor).await.unwrap();
        let text = protocol(&result);

        assert_eq!(result.output_format, OutputFormat::TeamCity);
        assert!(text.starts_with("TEST PROTOCOL\n##teamcity[testSuiteStarted name='00-build']\n"));
        assert!(text.contains("##teamcity[testStarted name='smoke']"));
        assert!(!text.contains("testFailed"));
    }

    #[tokio::test]
    async fn test_output_dir_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "").unwrap();

        let err = prepare_output_dir(Some(file)).await.unwrap_err();

        assert!(err.to_string().ends_with("is not a directory"));
        assert!(
            prepare_output_dir(Some(dir.path().join("a/b")))
                .await
                .unwrap()
                .is_dir()
        );
    }

    #[tokio::test]
    async fn test_relative_output_dir_is_made_absolute() {
        let relative = PathBuf::from(format!("target/intmaniac-out-{}", uuid::Uuid::new_v4().simple()));

        let output_dir = prepare_output_dir(Some(relative.clone())).await.unwrap();

        assert!(output_dir.is_absolute());
        assert!(output_dir.ends_with(&relative));
        assert!(output_dir.is_dir());

        std::fs::remove_dir_all(&output_dir).unwrap();
    }
}
