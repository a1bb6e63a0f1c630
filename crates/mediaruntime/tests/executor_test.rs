// crates/mediaruntime/tests/executor_test.rs

mod common;

use common::*;
use mediacore::{
    CapabilityError, ExecutionEvent, Node, NodeEvent, NodeKind, NodeStatus, RunStatus, TargetPort,
    Value, Workflow,
};
use mediaruntime::RuntimeConfig;
use std::sync::Arc;

fn text_nodes(workflow: &mut Workflow, ids: &[&str]) {
    for id in ids {
        workflow
            .add_node(Node::with_id(*id, NodeKind::Text).with_value(format!("value of {id}")))
            .unwrap();
    }
}

#[tokio::test]
async fn test_marketing_kit_resolves_ports_in_edge_order() {
    init_tracing();
    let llm = Arc::new(ScriptedLlm::new().then(Ok("Buy the headphones".to_string())));
    let runtime = runtime_with(marketing_kit(), Arc::clone(&llm));

    let run = runtime.run_workflow().await.expect("run should start");

    assert_eq!(run.status, RunStatus::Success);
    let calls = llm.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "persona string\ndetails string");
    assert_eq!(calls[0].images, vec![PRODUCT_PHOTO.to_string(), FRAME.to_string()]);
    assert_eq!(calls[0].system_prompt, None);

    let workflow = runtime.workflow().await;
    for node in &workflow.nodes {
        assert_eq!(node.status, NodeStatus::Success, "node {} should succeed", node.id);
    }
    assert_eq!(
        workflow.node("llm-1").unwrap().output,
        Some(Value::from("Buy the headphones"))
    );
    assert_eq!(workflow.node("crop-1").unwrap().output, Some(Value::from(PRODUCT_PHOTO)));
    assert_eq!(run.results.get("llm-1"), Some(&Value::from("Buy the headphones")));
}

#[tokio::test]
async fn test_llm_node_reports_prompt_shape() {
    let runtime = runtime_with(marketing_kit(), Arc::new(ScriptedLlm::new()));
    let mut events = runtime.subscribe_events();

    runtime.run_node("llm-1").await.unwrap();

    let infos: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeEvent {
                node_id,
                event: NodeEvent::Info { message },
                ..
            } if node_id == "llm-1" => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        infos,
        vec!["Prompting scripted with 2 text input(s) and 2 image(s)".to_string()]
    );
}

#[tokio::test]
async fn test_llm_own_value_and_system_prompt() {
    let mut workflow = Workflow::new("prompt");
    workflow
        .add_node(Node::with_id("persona", NodeKind::Text).with_value("persona string"))
        .unwrap();
    workflow
        .add_node(
            Node::with_id("llm", NodeKind::RunLlm)
                .with_value("Write three taglines.")
                .with_config("system_prompt", "Be brief."),
        )
        .unwrap();
    workflow.connect("persona", "llm", Some(TargetPort::Text)).unwrap();

    let llm = Arc::new(ScriptedLlm::new());
    let runtime = runtime_with(workflow, Arc::clone(&llm));
    runtime.run_workflow().await.unwrap();

    let calls = llm.calls();
    assert_eq!(calls[0].prompt, "persona string\nWrite three taglines.");
    assert_eq!(calls[0].system_prompt.as_deref(), Some("Be brief."));
}

#[tokio::test]
async fn test_cycle_fails_branch_with_message() {
    init_tracing();
    let mut workflow = Workflow::new("cycle");
    text_nodes(&mut workflow, &["a", "b"]);
    workflow.connect("a", "b", None).unwrap();
    workflow.connect("b", "a", None).unwrap();

    let runtime = runtime_with(workflow, Arc::new(ScriptedLlm::new()));
    let mut events = runtime.subscribe_events();

    let run = runtime.run_node("a").await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);

    let workflow = runtime.workflow().await;
    for id in ["a", "b"] {
        let node = workflow.node(id).unwrap();
        assert_eq!(node.status, NodeStatus::Error, "{id} should be in error");
        let message = node.error_message.as_deref().unwrap_or_default();
        assert!(message.contains("Circular dependency"), "unexpected message: {message}");
    }

    // b passes through running before it fails
    let events = drain(&mut events);
    let b_events: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeStarted { node_id, .. } if node_id == "b" => Some("started"),
            ExecutionEvent::NodeFailed { node_id, .. } if node_id == "b" => Some("failed"),
            _ => None,
        })
        .collect();
    assert_eq!(b_events, vec!["started", "failed"]);
}

#[tokio::test]
async fn test_self_loop_is_a_cycle() {
    let mut workflow = Workflow::new("self");
    text_nodes(&mut workflow, &["a"]);
    workflow.connect("a", "a", None).unwrap();

    let runtime = runtime_with(workflow, Arc::new(ScriptedLlm::new()));
    let run = runtime.run_node("a").await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(runtime.node("a").await.unwrap().status, NodeStatus::Error);
}

fn diamond() -> Workflow {
    let mut workflow = Workflow::new("diamond");
    text_nodes(&mut workflow, &["a", "b", "c"]);
    workflow.add_node(Node::with_id("d", NodeKind::RunLlm)).unwrap();
    workflow.connect("a", "b", None).unwrap();
    workflow.connect("a", "c", None).unwrap();
    workflow.connect("b", "d", Some(TargetPort::Text)).unwrap();
    workflow.connect("c", "d", Some(TargetPort::Text)).unwrap();
    workflow
}

#[tokio::test]
async fn test_diamond_waits_for_both_branches_and_shares_ancestor() {
    let llm = Arc::new(ScriptedLlm::new());
    let runtime = runtime_with(diamond(), Arc::clone(&llm));
    let mut events = runtime.subscribe_events();

    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(llm.calls()[0].prompt, "value of a\nvalue of a");
    let events = drain(&mut events);
    assert_eq!(started(&events, "a"), 1);
    assert_eq!(started(&events, "d"), 1);
}

#[tokio::test]
async fn test_diamond_without_memo_runs_shared_ancestor_per_path() {
    let config = RuntimeConfig {
        memoize_runs: false,
        ..test_config()
    };
    let llm = Arc::new(ScriptedLlm::new());
    let runtime = runtime_with_config(diamond(), Arc::clone(&llm), config);
    let mut events = runtime.subscribe_events();

    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(started(&drain(&mut events), "a"), 2);
    assert_eq!(runtime.node("d").await.unwrap().status, NodeStatus::Success);
}

#[tokio::test]
async fn test_shared_llm_ancestor_called_once_per_run() {
    let mut workflow = Workflow::new("shared llm");
    text_nodes(&mut workflow, &["seed"]);
    for id in ["root", "left", "right", "sink"] {
        workflow.add_node(Node::with_id(id, NodeKind::RunLlm)).unwrap();
    }
    workflow.connect("seed", "root", Some(TargetPort::Text)).unwrap();
    workflow.connect("root", "left", Some(TargetPort::Text)).unwrap();
    workflow.connect("root", "right", Some(TargetPort::Text)).unwrap();
    workflow.connect("left", "sink", Some(TargetPort::Text)).unwrap();
    workflow.connect("right", "sink", Some(TargetPort::Text)).unwrap();

    let llm = Arc::new(ScriptedLlm::new());
    let runtime = runtime_with(workflow, Arc::clone(&llm));
    runtime.run_workflow().await.unwrap();

    let root_calls = llm
        .calls()
        .iter()
        .filter(|c| c.prompt == "value of seed")
        .count();
    assert_eq!(root_calls, 1);
    assert_eq!(llm.calls().len(), 4);
}

#[tokio::test]
async fn test_capability_failure_cascades_to_dependents() {
    let mut workflow = Workflow::new("failure");
    text_nodes(&mut workflow, &["prompt", "summary"]);
    workflow.add_node(Node::with_id("llm", NodeKind::RunLlm)).unwrap();
    workflow.connect("prompt", "llm", Some(TargetPort::Text)).unwrap();
    workflow.connect("llm", "summary", None).unwrap();

    let llm = Arc::new(ScriptedLlm::new().then(Err(CapabilityError::Status {
        status: 401,
        message: "bad key".to_string(),
    })));
    let runtime = runtime_with(workflow, llm);

    let run = runtime.run_workflow().await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.results.is_empty());

    let workflow = runtime.workflow().await;
    assert_eq!(workflow.node("prompt").unwrap().status, NodeStatus::Success);
    for id in ["llm", "summary"] {
        let node = workflow.node(id).unwrap();
        assert_eq!(node.status, NodeStatus::Error);
        assert!(node.error_message.as_deref().unwrap().contains("401"));
    }
}

#[tokio::test]
async fn test_failed_sibling_does_not_leave_nodes_running() {
    let mut workflow = Workflow::new("siblings");
    text_nodes(&mut workflow, &["p1", "p2"]);
    for id in ["bad", "good", "sink"] {
        workflow.add_node(Node::with_id(id, NodeKind::RunLlm)).unwrap();
    }
    workflow.connect("p1", "bad", Some(TargetPort::Text)).unwrap();
    workflow.connect("p2", "good", Some(TargetPort::Text)).unwrap();
    workflow.connect("bad", "sink", Some(TargetPort::Text)).unwrap();
    workflow.connect("good", "sink", Some(TargetPort::Text)).unwrap();

    // The first call to start belongs to whichever branch is polled first, so
    // fail by prompt rather than by order.
    struct PickyLlm;
    #[async_trait::async_trait]
    impl mediaruntime::LlmCapability for PickyLlm {
        fn name(&self) -> &str {
            "picky"
        }
        async fn generate(
            &self,
            prompt: &str,
            _images: &[String],
            _system_prompt: Option<&str>,
        ) -> Result<String, CapabilityError> {
            if prompt.contains("p1") {
                Err(CapabilityError::Unavailable("overloaded".to_string()))
            } else {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok("fine".to_string())
            }
        }
    }

    let registry = mediaruntime::CapabilityRegistry::new(Arc::new(PickyLlm), Arc::new(FakeMedia::default()));
    let runtime = mediaruntime::FlowRuntime::with_config(workflow, registry, test_config());
    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let workflow = runtime.workflow().await;
    assert!(workflow.nodes.iter().all(|n| n.status != NodeStatus::Running));
    assert_eq!(workflow.node("good").unwrap().status, NodeStatus::Success);
    assert_eq!(workflow.node("sink").unwrap().status, NodeStatus::Error);
}

#[tokio::test]
async fn test_text_and_crop_prefer_upstream_values() {
    let mut workflow = Workflow::new("overrides");
    workflow
        .add_node(Node::with_id("upstream", NodeKind::Text).with_value("from upstream"))
        .unwrap();
    workflow
        .add_node(Node::with_id("local", NodeKind::Text).with_value("local edit"))
        .unwrap();
    workflow
        .add_node(Node::with_id("lonely-crop", NodeKind::CropImage).with_output("previous.png"))
        .unwrap();
    workflow.connect("upstream", "local", None).unwrap();

    let runtime = runtime_with(workflow, Arc::new(ScriptedLlm::new()));
    runtime.run_workflow().await.unwrap();

    let workflow = runtime.workflow().await;
    assert_eq!(workflow.node("local").unwrap().output, Some(Value::from("from upstream")));
    assert_eq!(workflow.node("local").unwrap().value.as_deref(), Some("local edit"));
    assert_eq!(
        workflow.node("lonely-crop").unwrap().output,
        Some(Value::from("previous.png"))
    );
}

#[tokio::test]
async fn test_upload_output_stable_across_runs() {
    let runtime = runtime_with(marketing_kit(), Arc::new(ScriptedLlm::new()));

    runtime.run_workflow().await.unwrap();
    runtime.run_workflow().await.unwrap();

    let photo = runtime.node("img-1").await.unwrap();
    assert_eq!(photo.output, Some(Value::from(PRODUCT_PHOTO)));
    assert_eq!(photo.status, NodeStatus::Success);
}

#[tokio::test]
async fn test_dangling_edge_resolves_to_null() {
    let json = r#"{
        "id": "0b8f6f7e-9d1c-4c9e-8a55-2f4f3d2b1a00",
        "name": "dangling",
        "nodes": [{"id": "t", "kind": "text", "label": "T", "value": "kept"}],
        "edges": [{"id": "e1", "source": "deleted", "target": "t"}]
    }"#;
    let workflow: Workflow = serde_json::from_str(json).unwrap();
    let runtime = runtime_with(workflow, Arc::new(ScriptedLlm::new()));

    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(runtime.node("t").await.unwrap().output, Some(Value::from("kept")));
}

#[tokio::test]
async fn test_node_retry_policy_recovers_transient_failure() {
    let mut workflow = Workflow::new("retry");
    workflow
        .add_node(Node::with_id("llm", NodeKind::RunLlm).with_value("hi").with_retry(3, 1))
        .unwrap();

    let llm = Arc::new(
        ScriptedLlm::new()
            .then(Err(CapabilityError::Transport("connection reset".to_string())))
            .then(Err(CapabilityError::Status {
                status: 503,
                message: "busy".to_string(),
            }))
            .then(Ok("hello".to_string())),
    );
    let runtime = runtime_with(workflow, Arc::clone(&llm));

    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(llm.calls().len(), 3);
    assert_eq!(runtime.node("llm").await.unwrap().output, Some(Value::from("hello")));
}

#[tokio::test]
async fn test_capability_timeout_marks_node_error() {
    let mut workflow = Workflow::new("timeout");
    workflow
        .add_node(Node::with_id("llm", NodeKind::RunLlm).with_value("hi"))
        .unwrap();

    // Never released, so the call can only end by timing out.
    let gate = Arc::new(tokio::sync::Notify::new());
    let llm = Arc::new(ScriptedLlm::new().gated(gate));
    let config = RuntimeConfig {
        capability_timeout: Some(std::time::Duration::from_millis(20)),
        ..test_config()
    };
    let runtime = runtime_with_config(workflow, llm, config);

    let run = runtime.run_workflow().await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let node = runtime.node("llm").await.unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert!(node.error_message.unwrap().contains("timed out"));
}
