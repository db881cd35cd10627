// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! End-to-end runs against a local JDK. Run with `cargo test -- --ignored`;
//! `JAVA_HOME` is honored when set.

use std::time::Duration;
use stepwise_common::{logging, HeapEntry, Value};
use stepwise_engine::{OutputSink, TraceError, Tracer, TracerConfig};
use tracing::info;

fn tracer() -> Tracer {
    let mut config = TracerConfig::default().with_stdout_sink(OutputSink::Stderr);
    if let Ok(home) = std::env::var("JAVA_HOME") {
        config = config.with_java_home(home);
    }
    Tracer::new(config)
}

#[tokio::test]
#[ignore = "needs a local JDK"]
async fn test_wrapped_method_is_traced() {
    logging::ensure_test_logging(None);
    info!("Running test");

    let code = "int sum(int[] nums) {\n    int total = 0;\n    for (int n : nums) {\n        total += n;\n    }\n    return total;\n}\n";
    let steps = tracer().trace(code, Some("nums=[1,2,3]")).await.unwrap();

    assert!(!steps.is_empty());
    assert_eq!(steps[0].line, 2);
    assert!(steps.iter().all(|step| (1..=7).contains(&step.line)));
    let last = steps.last().unwrap();
    assert_eq!(last.locals.get("total"), Some(&Value::Int(6)));
    assert!(last.heap.iter().any(|entry| matches!(entry, HeapEntry::Array { name: Some(name), items, .. } if name == "nums" && items.len() == 3)));
}

#[tokio::test]
#[ignore = "needs a local JDK"]
async fn test_linked_list_shapes() {
    logging::ensure_test_logging(None);
    info!("Running test");

    let code = r#"class ListNode {
    int val;
    ListNode next;
    ListNode(int val) { this.val = val; }
}

class Solution {
    ListNode build(int n) {
        ListNode head = null;
        for (int i = n; i > 0; i--) {
            ListNode node = new ListNode(i);
            node.next = head;
            head = node;
        }
        return head;
    }
}
"#;
    let steps = tracer().trace(code, Some("3")).await.unwrap();
    let last = steps.iter().rev().find(|step| step.locals.get("head").is_some_and(|v| v.ref_id().is_some())).unwrap();
    let nodes = last.heap.iter().filter(|entry| entry.kind() == "node").count();
    let lists = last.heap.iter().filter(|entry| entry.kind() == "list").count();
    assert_eq!(nodes, 3);
    assert_eq!(lists, 3);
}

#[tokio::test]
#[ignore = "needs a local JDK"]
async fn test_compile_error_is_verbatim() {
    logging::ensure_test_logging(None);
    info!("Running test");

    let err = tracer().trace("int broken(int a) { return a + ; }", Some("1")).await.unwrap_err();
    assert!(matches!(err, TraceError::Compile(_)));
    assert!(err.to_string().starts_with("Compilation failed: "));
}

#[tokio::test]
#[ignore = "needs a local JDK"]
async fn test_infinite_loop_hits_step_ceiling() {
    logging::ensure_test_logging(None);
    info!("Running test");

    let code = "void spin() {\n    int i = 0;\n    while (true) {\n        i++;\n        i--;\n    }\n}\n";
    let tracer = Tracer::new(tracer().config().clone().with_max_steps(200));
    let result = tracer.trace(code, None).await;
    assert!(result.is_ok(), "expected a partial trace, got {result:?}");
    let steps = result.unwrap();
    assert_eq!(steps.len(), 200);
    assert!(steps.iter().any(|step| step.line == 4));
    assert!(steps.iter().any(|step| step.line == 5));
}

#[tokio::test]
#[ignore = "needs a local JDK"]
async fn test_sleeping_program_times_out() {
    logging::ensure_test_logging(None);
    info!("Running test");

    let code = "void nap() throws Exception {\n    Thread.sleep(60000);\n}\n";
    let tracer = Tracer::new(tracer().config().clone().with_timeout(Duration::from_secs(3)));
    let err = tracer.trace(code, None).await.unwrap_err();
    assert!(matches!(err, TraceError::Timeout(_)));
}
