//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::core::{StepResults, Value};
    use crate::errors::GraphError;
    use crate::events::{self, CollectingEventSink};
    use crate::invoker::{InvocationResult, Invoker, MockInvoker, RegistryInvoker};
    use crate::pipeline::{BackoffStrategy, Pipeline, PipelineOptions};
    use crate::steps::Step;
    use crate::testing::{
        assert_pipeline_failed_at, assert_pipeline_succeeded, assert_respects_dependencies,
        assert_step_skipped, assert_step_succeeded, echo_action, failing_action, flaky_action,
        sleeping_action, RecordingInvoker,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn pipeline_of(name: &str, steps: &[Step]) -> Pipeline {
        steps
            .iter()
            .cloned()
            .try_fold(Pipeline::new(name), Pipeline::step)
            .unwrap()
    }

    fn review_steps() -> Vec<Step> {
        vec![
            Step::new("review", "code-review", "analyze"),
            Step::new("test-gen", "test-gen", "generate").with_dependency("review"),
            Step::new("security", "security", "scan").with_dependency("review"),
        ]
    }

    // --- Ordering ---

    #[tokio::test]
    async fn test_sequential_execution_order() {
        let invoker = Arc::new(RecordingInvoker::new());
        let result = pipeline_of("review", &review_steps())
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.execution_order, vec!["review", "test-gen", "security"]);
        assert_eq!(
            invoker.operations(),
            vec!["code-review.analyze", "test-gen.generate", "security.scan"]
        );
    }

    #[tokio::test]
    async fn test_sequential_order_matches_plan() {
        let steps = vec![
            Step::new("report", "svc", "report").with_dependencies(["scan", "lint"]),
            Step::new("lint", "svc", "lint"),
            Step::new("scan", "svc", "scan").with_dependency("lint"),
            Step::new("notify", "svc", "notify"),
        ];
        let pipeline = pipeline_of("p", &steps).with_invoker(Arc::new(RecordingInvoker::new()));
        let plan = pipeline.plan().unwrap();

        let result = pipeline.execute().await.unwrap();
        assert_eq!(result.execution_order, plan);
        assert_eq!(result.execution_order, vec!["lint", "scan", "report", "notify"]);
    }

    #[tokio::test]
    async fn test_parallel_steps_overlap() {
        let delay = Duration::from_millis(100);
        let steps = vec![
            Step::custom("a", sleeping_action(delay, json!("a"))),
            Step::custom("b", sleeping_action(delay, json!("b"))),
            Step::custom("c", sleeping_action(delay, json!("c"))),
        ];
        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        let results: Vec<_> = ["a", "b", "c"].iter().map(|n| result.step(n).unwrap()).collect();
        let latest_start = results.iter().map(|r| r.started_at).max().unwrap();
        let earliest_end = results.iter().map(|r| r.ended_at).min().unwrap();
        assert!(
            latest_start < earliest_end,
            "expected overlapping execution, latest start {latest_start}, earliest end {earliest_end}"
        );
    }

    #[tokio::test]
    async fn test_parallel_respects_dependencies() {
        let steps = vec![
            Step::custom("root", sleeping_action(Duration::from_millis(20), json!(1))),
            Step::custom("left", sleeping_action(Duration::from_millis(30), json!(2)))
                .with_dependency("root"),
            Step::custom("right", sleeping_action(Duration::from_millis(5), json!(3)))
                .with_dependency("root"),
            Step::custom("join", echo_action()).with_dependencies(["left", "right"]),
        ];
        let result = pipeline_of("diamond", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_respects_dependencies(&result, &steps);
        assert_eq!(result.execution_order.first().map(String::as_str), Some("root"));
        assert_eq!(result.execution_order.last().map(String::as_str), Some("join"));
        // right is shorter, so it finishes first
        assert!(result.position("right") < result.position("left"));
    }

    #[tokio::test]
    async fn test_parallel_dispatch_does_not_wait_for_batch() {
        let steps = vec![
            Step::custom("a", sleeping_action(Duration::from_millis(10), json!("a"))),
            Step::custom("b", sleeping_action(Duration::from_millis(100), json!("b"))),
            Step::custom("c", echo_action()).with_dependency("a"),
        ];
        let result = pipeline_of("reactive", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        let c = result.step("c").unwrap();
        let b = result.step("b").unwrap();
        assert!(
            c.started_at < b.ended_at,
            "c started at {} after b ended at {}",
            c.started_at,
            b.ended_at
        );
        assert_eq!(result.execution_order, vec!["a", "c", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_concurrency_still_runs_steps() {
        let steps = vec![
            Step::custom("a", echo_action()),
            Step::custom("b", echo_action()).with_dependency("a"),
        ];
        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_parallel(true).with_max_concurrency(0))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.execution_order, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrency_caps_running_steps() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Step> = (0..5)
            .map(|i| {
                let current = current.clone();
                let peak = peak.clone();
                Step::custom(format!("job-{i}"), move |_| {
                    let current = current.clone();
                    let peak = peak.clone();
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!(i))
                    }
                })
            })
            .collect();

        let result = pipeline_of("capped", &steps)
            .with_options(PipelineOptions::new().with_parallel(true).with_max_concurrency(2))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.results.len(), 5);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    // --- Failure ---

    #[tokio::test]
    async fn test_failing_step_stops_dependents() {
        let invoker = Arc::new(
            RecordingInvoker::new().with_response("test-gen", "generate", InvocationResult::fail("model overloaded")),
        );
        let steps = vec![
            Step::new("review", "code-review", "analyze"),
            Step::new("test-gen", "test-gen", "generate")
                .with_dependency("review")
                .with_params(json!({"lang": "rust"})),
            Step::new("publish", "ci", "publish").with_dependency("test-gen"),
        ];

        let result = pipeline_of("p", &steps)
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "test-gen");
        assert_eq!(result.error.as_deref(), Some("model overloaded"));
        assert_eq!(result.failed_params, Some(json!({"lang": "rust"})));
        assert!(result.step("publish").is_none());
        assert_eq!(result.step("test-gen").map(|r| r.success), Some(false));
        assert!(invoker.calls_to("ci", "publish").is_empty());
    }

    #[tokio::test]
    async fn test_sequential_failure_dispatches_nothing_more() {
        let steps = vec![
            Step::custom("first", failing_action("boom")),
            Step::new("independent", "svc", "op"),
        ];
        let invoker = Arc::new(RecordingInvoker::new());

        let result = pipeline_of("p", &steps)
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "first");
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(invoker.call_count(), 0);
        assert_eq!(result.execution_order, vec!["first"]);
    }

    #[tokio::test]
    async fn test_parallel_failure_lets_in_flight_steps_finish() {
        let steps = vec![
            Step::custom("fast-fail", failing_action("bad input")),
            Step::custom("slow", sleeping_action(Duration::from_millis(50), json!("done"))),
            Step::custom("after", echo_action()).with_dependency("fast-fail"),
        ];

        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "fast-fail");
        assert_step_succeeded(&result, "slow");
        assert!(result.step("after").is_none());
        assert_eq!(result.execution_order, vec!["fast-fail", "slow"]);
    }

    #[tokio::test]
    async fn test_panicking_step_is_captured() {
        async fn explode(_: Value) -> anyhow::Result<Value> {
            panic!("index out of bounds")
        }

        let steps = vec![
            Step::custom("boom", explode),
            Step::custom("sibling", sleeping_action(Duration::from_millis(20), json!(1))),
        ];

        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "boom");
        assert_eq!(result.error.as_deref(), Some("Step panicked: index out of bounds"));
        assert_step_succeeded(&result, "sibling");
    }

    #[tokio::test]
    async fn test_missing_invoker_fails_step() {
        let result = Pipeline::new("p")
            .step(Step::new("scan", "security", "scan"))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "scan");
        assert!(result.error.unwrap().contains("No invoker configured"));
    }

    // --- Retry ---

    #[tokio::test]
    async fn test_retry_succeeds_on_nth_attempt() {
        let (action, calls) = flaky_action(3);
        let result = Pipeline::new("p")
            .with_options(PipelineOptions::new().with_max_retries(3))
            .step(Step::custom("flaky", action))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(calls.count(), 3);
        assert_eq!(result.step("flaky").unwrap().attempts, 3);
        assert_eq!(result.data("flaky"), Some(&json!({"attempt": 3})));
    }

    #[tokio::test]
    async fn test_retry_exhausted_reports_last_error() {
        let (action, calls) = flaky_action(10);
        let result = Pipeline::new("p")
            .with_options(PipelineOptions::new().with_max_retries(2))
            .step(Step::custom("flaky", action))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "flaky");
        assert_eq!(calls.count(), 2);
        assert_eq!(result.error.as_deref(), Some("transient failure on attempt 2"));
        assert_eq!(result.step("flaky").unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_no_retries_means_single_attempt() {
        let (action, calls) = flaky_action(2);
        let result = Pipeline::new("p")
            .step(Step::custom("flaky", action))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_delays_attempts() {
        let (action, calls) = flaky_action(3);
        let start = tokio::time::Instant::now();

        let result = Pipeline::new("p")
            .with_options(
                PipelineOptions::new()
                    .with_max_retries(3)
                    .with_backoff(BackoffStrategy::Linear, 100),
            )
            .step(Step::custom("flaky", action))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(calls.count(), 3);
        // 100ms after attempt 1, 200ms after attempt 2
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retry_reuses_effective_params() {
        let invoker = Arc::new(
            RecordingInvoker::new()
                .with_response("svc", "op", InvocationResult::fail("try again"))
                .with_response("svc", "op", InvocationResult::ok(json!("ok"))),
        );
        let transforms = Arc::new(AtomicUsize::new(0));
        let counter = transforms.clone();

        let result = Pipeline::new("p")
            .with_invoker(invoker.clone())
            .with_options(PipelineOptions::new().with_max_retries(2))
            .step(Step::new("call", "svc", "op").with_transform(move |_| {
                json!({"n": counter.fetch_add(1, Ordering::SeqCst)})
            }))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(transforms.load(Ordering::SeqCst), 1);
        let params: Vec<Value> = invoker.calls().into_iter().map(|c| c.params).collect();
        assert_eq!(params, vec![json!({"n": 0}), json!({"n": 0})]);
    }

    // --- Timeout ---

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_run_and_keeps_earlier_results() {
        let steps = vec![
            Step::custom("quick", echo_action()),
            Step::custom("slow", sleeping_action(Duration::from_secs(5), json!("late")))
                .with_dependency("quick"),
            Step::custom("never", echo_action()).with_dependency("slow"),
        ];
        let sink = Arc::new(CollectingEventSink::new());

        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_timeout(Duration::from_millis(50)))
            .with_event_sink(sink.clone())
            .execute()
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.error.as_deref(), Some("Pipeline timed out after 50ms"));
        assert_step_succeeded(&result, "quick");
        assert!(result.step("slow").is_none());
        assert!(result.step("never").is_none());
        assert_eq!(sink.events_of_type(events::PIPELINE_TIMEOUT).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_pipeline_beats_timeout() {
        let result = Pipeline::new("p")
            .with_options(PipelineOptions::new().with_timeout(Duration::from_secs(1)))
            .step(Step::custom("s", sleeping_action(Duration::from_millis(10), json!(1))))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert!(!result.timed_out);
    }

    // --- Transform & condition ---

    #[tokio::test]
    async fn test_transform_output_is_action_input() {
        let invoker = Arc::new(
            RecordingInvoker::new()
                .with_response("repo", "list", InvocationResult::ok(json!({"files": ["a.rs", "b.rs"]}))),
        );
        let steps = vec![
            Step::new("list", "repo", "list"),
            Step::new("review", "code-review", "analyze")
                .with_dependency("list")
                .with_params(json!({"ignored": true}))
                .with_transform(|results: &StepResults| {
                    json!({ "paths": results["list"].data["files"], "strict": true })
                }),
        ];

        let result = pipeline_of("p", &steps)
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        let calls = invoker.calls_to("code-review", "analyze");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params, json!({"paths": ["a.rs", "b.rs"], "strict": true}));
    }

    #[tokio::test]
    async fn test_failed_params_are_transformed_params() {
        let steps = vec![
            Step::custom("seed", |_| async { Ok(json!(7)) }),
            Step::custom("use", failing_action("rejected"))
                .with_dependency("seed")
                .with_transform(|results: &StepResults| json!({"seed": results["seed"].data})),
        ];

        let result = pipeline_of("p", &steps).execute().await.unwrap();

        assert_pipeline_failed_at(&result, "use");
        assert_eq!(result.failed_params, Some(json!({"seed": 7})));
    }

    #[tokio::test]
    async fn test_condition_false_skips_without_failing() {
        let invoker = Arc::new(RecordingInvoker::new());
        let steps = vec![
            Step::new("review", "code-review", "analyze"),
            Step::new("security", "security", "scan")
                .with_dependency("review")
                .with_condition(|_| false),
            Step::new("test-gen", "test-gen", "generate").with_dependency("review"),
            Step::new("report", "report", "write").with_dependency("security"),
        ];

        let result = pipeline_of("p", &steps)
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_step_skipped(&result, "security");
        assert_step_succeeded(&result, "test-gen");
        assert_step_succeeded(&result, "report");
        assert_eq!(result.skipped, vec!["security"]);
        assert_eq!(result.execution_order, vec!["review", "test-gen", "report"]);
        assert!(invoker.calls_to("security", "scan").is_empty());
    }

    #[tokio::test]
    async fn test_condition_reads_prior_results() {
        let steps = vec![
            Step::custom("detect", |_| async { Ok(json!({"has_tests": true})) }),
            Step::custom("run-tests", echo_action())
                .with_dependency("detect")
                .with_condition(|results: &StepResults| results["detect"].data["has_tests"] == json!(true)),
            Step::custom("write-tests", echo_action())
                .with_dependency("detect")
                .with_condition(|results: &StepResults| results["detect"].data["has_tests"] == json!(false)),
        ];

        let result = pipeline_of("p", &steps)
            .with_options(PipelineOptions::new().with_parallel(true))
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_step_succeeded(&result, "run-tests");
        assert_step_skipped(&result, "write-tests");
    }

    #[tokio::test]
    async fn test_skip_chain_releases_descendants() {
        let steps = vec![
            Step::custom("a", echo_action()).with_condition(|_| false),
            Step::custom("b", echo_action()).with_dependency("a").with_condition(|_| false),
            Step::custom("c", echo_action()).with_dependency("b"),
        ];

        let result = pipeline_of("p", &steps).execute().await.unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.skipped, vec!["a", "b"]);
        assert_eq!(result.execution_order, vec!["c"]);
    }

    // --- Sub-pipelines ---

    fn checks() -> Pipeline {
        Pipeline::new("checks")
            .step(Step::custom("lint", sleeping_action(Duration::from_millis(10), json!("lint"))))
            .unwrap()
            .step(Step::custom("format", echo_action()).with_dependency("lint"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_sub_pipeline_ordering() {
        for parallel in [false, true] {
            let pipeline = Pipeline::new("ci")
                .with_options(PipelineOptions::new().with_parallel(parallel))
                .step(Step::custom("setup", echo_action()))
                .unwrap()
                .sub_pipeline("checks", checks(), &["setup"])
                .unwrap()
                .step(Step::custom("report", echo_action()).with_dependency("checks"))
                .unwrap();

            let result = pipeline.execute().await.unwrap();

            assert_pipeline_succeeded(&result);
            assert_eq!(result.execution_order, vec!["setup", "lint", "format", "report"]);
        }
    }

    #[tokio::test]
    async fn test_sub_pipeline_options_are_ignored() {
        let (action, calls) = flaky_action(2);
        let sub = Pipeline::new("sub")
            .with_options(PipelineOptions::new().with_max_retries(5))
            .step(Step::custom("flaky", action))
            .unwrap();

        let result = Pipeline::new("parent")
            .sub_pipeline("sub", sub, &[])
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_failed_at(&result, "flaky");
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_dependency_on_empty_sub_pipeline_waits_for_its_deps() {
        let pipeline = Pipeline::new("parent")
            .step(Step::custom("next", echo_action()).with_dependency("nothing"))
            .unwrap()
            .step(Step::custom("setup", sleeping_action(Duration::from_millis(10), json!(1))))
            .unwrap()
            .sub_pipeline("nothing", Pipeline::new("nothing"), &["setup"])
            .unwrap()
            .with_options(PipelineOptions::new().with_parallel(true));

        assert_eq!(pipeline.plan().unwrap(), vec!["setup", "next"]);
        let result = pipeline.execute().await.unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.execution_order, vec!["setup", "next"]);
    }

    #[tokio::test]
    async fn test_sub_pipeline_step_name_collision() {
        let sub = Pipeline::new("sub").step(Step::custom("setup", echo_action())).unwrap();
        let pipeline = Pipeline::new("parent")
            .step(Step::custom("setup", echo_action()))
            .unwrap()
            .sub_pipeline("sub", sub, &[])
            .unwrap();

        let err = pipeline.execute().await.unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep { name: "setup".into() });
    }

    // --- Graph errors ---

    #[tokio::test]
    async fn test_unknown_dependency_is_graph_error() {
        let pipeline = Pipeline::new("p")
            .step(Step::new("deploy", "ci", "deploy").with_dependency("build"))
            .unwrap();

        let err = pipeline.execute().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown dependency: step 'deploy' depends on unknown step 'build'"
        );
        assert_eq!(err.error_info().code, "GRAPH-UNKNOWN-DEP");
    }

    #[tokio::test]
    async fn test_cycle_is_graph_error_before_any_step_runs() {
        let invoker = Arc::new(RecordingInvoker::new());
        let steps = vec![
            Step::new("root", "svc", "op"),
            Step::new("a", "svc", "op").with_dependency("b"),
            Step::new("b", "svc", "op").with_dependency("a"),
        ];

        let err = pipeline_of("p", &steps)
            .with_invoker(invoker.clone())
            .execute()
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Cycle detected: a -> b -> a");
        assert_eq!(invoker.call_count(), 0);
    }

    #[test]
    fn test_duplicate_step_rejected_on_add() {
        let err = Pipeline::new("p")
            .step(Step::new("a", "svc", "op"))
            .unwrap()
            .step(Step::new("a", "svc", "other"))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep { name: "a".into() });
    }

    // --- Invokers ---

    #[tokio::test]
    async fn test_registry_invoker_routes_targets() {
        let registry = RegistryInvoker::new();
        registry.register("math", "double", |params: Value| async move {
            let n = params["n"].as_i64().unwrap_or_default();
            InvocationResult::ok(json!(n * 2))
        });

        let steps = vec![
            Step::new("double", "math", "double").with_params(json!({"n": 21})),
            Step::new("triple", "math", "triple").with_dependency("double"),
        ];
        let result = pipeline_of("p", &steps)
            .with_invoker(Arc::new(registry))
            .execute()
            .await
            .unwrap();

        assert_eq!(result.data("double"), Some(&json!(42)));
        assert_pipeline_failed_at(&result, "triple");
        assert_eq!(result.error.as_deref(), Some("Unknown target 'math.triple'"));
    }

    #[tokio::test]
    async fn test_mock_invoker_through_pipeline() {
        let mut mock = MockInvoker::new();
        mock.expect_call()
            .withf(|collaborator, operation, _| collaborator == "code-review" && operation == "analyze")
            .times(1)
            .returning(|_, _, _| InvocationResult::ok(json!({"issues": 0})));
        mock.expect_call()
            .withf(|_, operation, params| operation == "scan" && params["issues"] == json!(0))
            .times(1)
            .returning(|_, _, _| InvocationResult::ok(json!("clean")));

        let invoker: Arc<dyn Invoker> = Arc::new(mock);
        let result = Pipeline::new("p")
            .with_invoker(invoker)
            .step(Step::new("review", "code-review", "analyze"))
            .unwrap()
            .step(
                Step::new("scan", "security", "scan")
                    .with_dependency("review")
                    .with_transform(|results: &StepResults| results["review"].data.clone()),
            )
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(result.data("scan"), Some(&json!("clean")));
    }

    // --- Events & results ---

    #[tokio::test]
    async fn test_failure_events_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let (action, _) = flaky_action(10);

        let result = Pipeline::new("p")
            .with_event_sink(sink.clone())
            .with_options(PipelineOptions::new().with_max_retries(2))
            .step(Step::custom("ok", echo_action()))
            .unwrap()
            .step(Step::custom("flaky", action).with_dependency("ok"))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            sink.event_types(),
            vec![
                events::PIPELINE_STARTED,
                events::STEP_STARTED,
                events::STEP_COMPLETED,
                events::STEP_STARTED,
                events::STEP_RETRYING,
                events::STEP_FAILED,
                events::PIPELINE_FAILED,
            ]
        );

        let (_, failed) = &sink.events_of_type(events::PIPELINE_FAILED)[0];
        assert_eq!(failed.as_ref().unwrap()["failed_step"], json!("flaky"));
    }

    #[tokio::test]
    async fn test_options_from_json_drive_execution() {
        let options = PipelineOptions::from_json(r#"{"parallel": true, "maxRetries": 2}"#).unwrap();
        let (action, calls) = flaky_action(2);

        let result = Pipeline::new("p")
            .with_options(options)
            .step(Step::custom("flaky", action))
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_pipeline_succeeded(&result);
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn test_result_serializes_camel_case() {
        let result = Pipeline::new("p")
            .step(Step::custom("a", |_| async { Ok(json!({"k": "v"})) }))
            .unwrap()
            .execute()
            .await
            .unwrap();

        let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["executionOrder"], json!(["a"]));
        assert_eq!(value["results"]["a"]["data"], json!({"k": "v"}));
        assert_eq!(value["results"]["a"]["attempts"], json!(1));
        assert_eq!(value["runId"], json!(result.run_id.to_string()));
    }
}
