use std::sync::Arc;

use parking_lot::Mutex;
use tester::{Cmd, CmdResult, ExtensionTester, StatusCode, TesterBuilder, TesterEnv};

use crate::fixtures::{scenario_config, DefaultExtension};

/// Checks the greeting the extension sends on start.
struct GreetingTester {
    expected: String,
    received: Arc<Mutex<Option<String>>>,
}

impl ExtensionTester for GreetingTester {
    fn on_cmd(&mut self, env: &TesterEnv, cmd: Cmd) {
        if cmd.name != "greeting" {
            return;
        }
        let actual = String::from_utf8_lossy(&cmd.payload).into_owned();
        let status = if actual == self.expected {
            StatusCode::Ok
        } else {
            StatusCode::Error
        };
        *self.received.lock() = Some(actual);
        env.return_result(CmdResult::for_cmd(status, &cmd), None)
            .expect("return result");
        env.stop_test().expect("stop test");
    }
}

fn run_greeting(property_json: &str, expected: &str) -> Option<String> {
    crate::init_logging();
    let received = Arc::new(Mutex::new(None));
    let report = TesterBuilder::new(scenario_config())
        .set_test_mode_single("default_extension", property_json)
        .build(DefaultExtension::default())
        .expect("build tester app")
        .run(GreetingTester {
            expected: expected.to_string(),
            received: Arc::clone(&received),
        })
        .expect("run completes");
    assert_eq!(report.env.results_returned, 1);
    let greeting = received.lock().clone();
    greeting
}

/// The greeting configured through properties reaches the tester.
#[test]
fn greeting_from_properties() {
    let got = run_greeting(r#"{"greetingMsg": "hello, world"}"#, "hello, world");
    assert_eq!(got.as_deref(), Some("hello, world"));
}

/// Unicode survives the trip as opaque payload bytes.
#[test]
fn greeting_unicode() {
    let got = run_greeting(r#"{"greetingMsg": "你好，世界"}"#, "你好，世界");
    assert_eq!(got.as_deref(), Some("你好，世界"));
}
