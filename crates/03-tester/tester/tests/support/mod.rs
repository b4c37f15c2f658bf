#![allow(dead_code)]

use std::time::Duration;

use serde_json::Value;
use tester::{
    AudioFrame, Cmd, CmdResult, Data, Extension, ExtensionEnv, StatusCode, TesterApp,
    TesterBuilder, TesterConfig, VideoFrame,
};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Extension answering a handful of well-known commands and echoing every
/// one-way message back to the tester.
#[derive(Default)]
pub struct Echo {
    greeting: Option<String>,
    held: Vec<Cmd>,
}

impl Extension for Echo {
    fn on_init(&mut self, _env: &ExtensionEnv, properties: &Value) {
        self.greeting = properties
            .get("greeting")
            .and_then(Value::as_str)
            .map(str::to_owned);
    }

    fn on_cmd(&mut self, env: &ExtensionEnv, cmd: Cmd) {
        match cmd.name.as_str() {
            "ping" => {
                let detail = self.greeting.clone().unwrap_or_else(|| "pong".to_string());
                let result = CmdResult::for_cmd(StatusCode::Ok, &cmd).with_detail(detail);
                env.return_result(result).expect("answer ping");
            }
            "stream" => {
                for (detail, is_final) in [("A", false), ("B", false), ("C", true)] {
                    let result = CmdResult::for_cmd(StatusCode::Ok, &cmd)
                        .with_detail(detail)
                        .with_final(is_final);
                    env.return_result(result).expect("stream result");
                }
            }
            "hold" => self.held.push(cmd),
            "call_back" => {
                let original = cmd;
                env.send_cmd(Cmd::new("from_ext"), move |env, outcome| {
                    let detail = match outcome {
                        Ok(result) => result.detail.unwrap_or_default(),
                        Err(err) => err.to_string(),
                    };
                    let result = CmdResult::for_cmd(StatusCode::Ok, &original).with_detail(detail);
                    env.return_result(result).expect("answer call_back");
                })
                .expect("send from_ext");
            }
            _ => {
                let result = CmdResult::for_cmd(StatusCode::Error, &cmd).with_detail("unknown");
                env.return_result(result).expect("answer unknown");
            }
        }
    }

    fn on_data(&mut self, env: &ExtensionEnv, data: Data) {
        let echo = Data::new(format!("{}_echo", data.name)).with_payload(data.payload);
        env.send_data(echo).expect("echo data");
    }

    fn on_audio_frame(&mut self, env: &ExtensionEnv, frame: AudioFrame) {
        let mut echo = AudioFrame::new(format!("{}_echo", frame.name)).with_buf(frame.buf);
        echo.timestamp = frame.timestamp;
        env.send_audio_frame(echo).expect("echo audio");
    }

    fn on_video_frame(&mut self, env: &ExtensionEnv, frame: VideoFrame) {
        let echo = VideoFrame::new(format!("{}_echo", frame.name)).with_image(
            frame.width,
            frame.height,
            frame.buf,
        );
        env.send_video_frame(echo).expect("echo video");
    }
}

pub fn config() -> TesterConfig {
    TesterConfig::default().with_run_timeout(WAIT)
}

pub fn build(extension: impl Extension) -> TesterApp {
    init_logging();
    TesterBuilder::new(config())
        .set_test_mode_single("echo", "")
        .build(extension)
        .expect("build tester app")
}
