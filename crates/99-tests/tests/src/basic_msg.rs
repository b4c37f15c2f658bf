use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tester::{
    tester_log, AudioFrame, Cmd, CmdResult, Data, ExtensionTester, LogLevel, RunReport, State,
    StatusCode, TesterBuilder, TesterEnv, VideoFrame,
};

use crate::fixtures::{scenario_config, DefaultExtension};

fn run(tester: impl ExtensionTester) -> RunReport {
    crate::init_logging();
    TesterBuilder::new(scenario_config())
        .set_test_mode_single("default_extension", "{}")
        .build(DefaultExtension::default())
        .expect("build tester app")
        .run(tester)
        .expect("run completes")
}

fn stop(env: &TesterEnv) {
    env.stop_test().expect("stop test");
}

struct CmdTester {
    pong: Arc<AtomicBool>,
}

impl ExtensionTester for CmdTester {
    fn on_start(&mut self, env: &TesterEnv) {
        tester_log!(env, LogLevel::Info, "CmdTester on_start").expect("log");
        env.on_start_done().expect("start done");
        env.send_cmd(Cmd::new("ping"), |_, outcome| {
            assert!(outcome.expect("ping result").is_ok());
        })
        .expect("send ping");
    }

    fn on_cmd(&mut self, env: &TesterEnv, cmd: Cmd) {
        if cmd.name == "pong" {
            tester_log!(env, LogLevel::Info, "pong cmd received").expect("log");
            self.pong.store(true, Ordering::SeqCst);
            env.return_result(CmdResult::for_cmd(StatusCode::Ok, &cmd), None)
                .expect("return result");
            stop(env);
        }
    }
}

/// Ping command in, pong command back, answered by the tester.
#[test]
fn cmd_ping_pong() {
    let pong = Arc::new(AtomicBool::new(false));
    let report = run(CmdTester {
        pong: Arc::clone(&pong),
    });
    assert!(pong.load(Ordering::SeqCst));
    assert_eq!(report.final_state, State::Deinited);
    assert_eq!(report.env.results, 1);
    assert_eq!(report.env.results_returned, 1);
}

#[derive(Default)]
struct DataTester {
    pong: Arc<AtomicBool>,
}

impl ExtensionTester for DataTester {
    fn on_start(&mut self, env: &TesterEnv) {
        env.on_start_done().expect("start done");
        env.send_data(Data::new("ping"), None).expect("send data");
    }

    fn on_data(&mut self, env: &TesterEnv, data: Data) {
        if data.name == "pong" {
            self.pong.store(true, Ordering::SeqCst);
            stop(env);
        }
    }
}

#[test]
fn data_ping_pong() {
    let tester = DataTester::default();
    let pong = Arc::clone(&tester.pong);
    let report = run(tester);
    assert!(pong.load(Ordering::SeqCst));
    assert_eq!(report.env.one_way_sent, 1);
}

#[derive(Default)]
struct AudioFrameTester {
    pong: Arc<AtomicBool>,
}

impl ExtensionTester for AudioFrameTester {
    fn on_start(&mut self, env: &TesterEnv) {
        env.on_start_done().expect("start done");
        env.send_audio_frame(AudioFrame::new("ping"), None)
            .expect("send audio frame");
    }

    fn on_audio_frame(&mut self, env: &TesterEnv, frame: AudioFrame) {
        if frame.name == "pong" {
            self.pong.store(true, Ordering::SeqCst);
            stop(env);
        }
    }
}

#[test]
fn audio_frame_ping_pong() {
    let tester = AudioFrameTester::default();
    let pong = Arc::clone(&tester.pong);
    run(tester);
    assert!(pong.load(Ordering::SeqCst));
}

#[derive(Default)]
struct VideoFrameTester {
    pong: Arc<AtomicBool>,
}

impl ExtensionTester for VideoFrameTester {
    fn on_start(&mut self, env: &TesterEnv) {
        env.on_start_done().expect("start done");
        env.send_video_frame(VideoFrame::new("ping"), None)
            .expect("send video frame");
    }

    fn on_video_frame(&mut self, env: &TesterEnv, frame: VideoFrame) {
        if frame.name == "pong" {
            self.pong.store(true, Ordering::SeqCst);
            stop(env);
        }
    }
}

#[test]
fn video_frame_ping_pong() {
    let tester = VideoFrameTester::default();
    let pong = Arc::clone(&tester.pong);
    run(tester);
    assert!(pong.load(Ordering::SeqCst));
}
