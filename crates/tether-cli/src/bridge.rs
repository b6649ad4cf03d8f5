use serde_json::{Map, Value};
use tether_runtime::surface::menu::{MenuItem, ResolvedSection};
use tether_runtime::{AccelConfig, ClearScope, DecodedImage, RenderBridge, VibeKind};
use tracing::info;

/// Render bridge for a headless host: every call becomes a log line
#[derive(Debug, Default)]
pub struct LogBridge;

fn compact(props: &Map<String, Value>) -> String {
    serde_json::to_string(props).unwrap_or_else(|_| "{..}".to_string())
}

impl RenderBridge for LogBridge {
    fn window(&self, props: &Map<String, Value>, clear: ClearScope) {
        info!(target: "bridge", "window [{}] {}", clear, compact(props));
    }

    fn card(&self, props: &Map<String, Value>, clear: ClearScope) {
        info!(target: "bridge", "card [{}] {}", clear, compact(props));
    }

    fn menu(&self, state: &Map<String, Value>) {
        info!(target: "bridge", "menu {}", compact(state));
    }

    fn menu_section(&self, section: usize, content: &ResolvedSection) {
        info!(
            target: "bridge",
            "menu section {} {:?} ({} items)",
            section,
            content.title.as_deref().unwrap_or(""),
            content.items.len()
        );
    }

    fn menu_item(&self, section: usize, item: usize, content: &MenuItem) {
        info!(
            target: "bridge",
            "menu item {}:{} {:?}",
            section,
            item,
            content.title.as_deref().unwrap_or("")
        );
    }

    fn image(&self, id: u32, image: &DecodedImage) {
        info!(target: "bridge", "image {} ({} bytes)", id, image.bytes.len());
    }

    fn accel_config(&self, config: &AccelConfig) {
        info!(
            target: "bridge",
            "accel rate={} samples={} subscribed={} ({})",
            config.rate,
            config.sample_batch_size,
            config.subscribed,
            config.subscribe_mode
        );
    }

    fn accel_peek(&self) {
        info!(target: "bridge", "accel peek");
    }

    fn vibe(&self, kind: VibeKind) {
        info!(target: "bridge", "vibe {}", kind);
    }

    fn open_url(&self, url: &str) {
        info!(target: "bridge", "open {}", url);
    }
}
