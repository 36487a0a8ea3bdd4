use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsplay_executor::SandboxConfig;
use jsplay_runtime::OutputKind;
use serial_test::serial;

use crate::{ConsoleLine, ConsoleSink, OutputSlot, Playground, PlaygroundOptions};

mod session;

/// Sink that remembers everything it was given
#[derive(Default)]
struct RecordingSink {
    renders: Mutex<Vec<Vec<ConsoleLine>>>,
    notices: Mutex<Vec<(OutputKind, String)>>,
}

impl RecordingSink {
    fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    /// Rendered texts, one entry per render from `start` on
    fn render_texts_since(&self, start: usize) -> Vec<Vec<String>> {
        self.renders.lock().unwrap()[start..]
            .iter()
            .map(|lines| lines.iter().map(|l| l.content.to_text()).collect())
            .collect()
    }

    fn last_render(&self) -> Vec<ConsoleLine> {
        self.renders.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl ConsoleSink for RecordingSink {
    fn render(&self, lines: &[ConsoleLine]) {
        self.renders.lock().unwrap().push(lines.to_vec());
    }

    fn notice(&self, kind: OutputKind, message: &str) {
        self.notices.lock().unwrap().push((kind, message.to_string()));
    }
}

fn playground_with(options: PlaygroundOptions) -> (Playground, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let playground = Playground::new(options, Arc::clone(&sink) as Arc<dyn ConsoleSink>);
    (playground, sink)
}

fn playground() -> (Playground, Arc<RecordingSink>) {
    playground_with(PlaygroundOptions::default())
}

fn playground_with_timeout(timeout: Duration) -> (Playground, Arc<RecordingSink>) {
    playground_with(PlaygroundOptions {
        sandbox: SandboxConfig {
            timeout,
            ..Default::default()
        },
        ..Default::default()
    })
}

fn texts(slots: &[OutputSlot]) -> Vec<String> {
    slots.iter().map(|s| s.content.to_text()).collect()
}

#[serial]
#[tokio::test]
async fn test_playground_options_from_config() {
    let mut config = jsplay_config::Config::default();
    config.execution.timeout_ms = 7_000;
    config.auto_run.enabled = true;
    config.auto_run.debounce_ms = 250;
    config.cache.smart_mode = false;

    let options = PlaygroundOptions::from(&config);
    assert_eq!(options.sandbox.timeout, Duration::from_millis(7_000));
    assert!(options.auto_run);
    assert_eq!(options.debounce, Duration::from_millis(250));
    assert!(!options.cache.smart_mode);

    let (playground, _) = playground_with(options);
    assert!(playground.auto_run_enabled());
    assert!(!playground.cache_stats().smart_mode);
}
