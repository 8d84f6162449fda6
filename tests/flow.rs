//! End-to-end dialogue tests: the flow engine wired to a fake delivery and a
//! pinned config provider, driving real renders against a synthesized
//! template.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use tempfile::TempDir;

use stampbot::config::{Color, FixedConfigProvider, RenderConfig};
use stampbot::flow::{Delivery, FlowEngine};
use stampbot::session::ChatId;

const CHAT: ChatId = 100;
const PATTERN: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug)]
struct PhotoCall {
    chat: ChatId,
    path: PathBuf,
    caption: String,
    /// Whether the artifact existed at the moment of delivery.
    existed: bool,
}

#[derive(Default)]
struct FakeDelivery {
    texts: Mutex<Vec<(ChatId, String)>>,
    photos: Mutex<Vec<PhotoCall>>,
    fail_photo: bool,
}

impl FakeDelivery {
    fn texts(&self) -> Vec<(ChatId, String)> {
        self.texts.lock().unwrap().clone()
    }

    fn last_text(&self) -> String {
        self.texts.lock().unwrap().last().unwrap().1.clone()
    }

    fn text_count(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

impl Delivery for FakeDelivery {
    fn send_text<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.texts.lock().unwrap().push((chat, text.to_string()));
            Ok(())
        })
    }

    fn send_photo<'a>(
        &'a self,
        chat: ChatId,
        path: &'a Path,
        caption: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.photos.lock().unwrap().push(PhotoCall {
                chat,
                path: path.to_path_buf(),
                caption: caption.to_string(),
                existed: path.exists(),
            });
            if self.fail_photo {
                anyhow::bail!("simulated delivery failure");
            }
            Ok(())
        })
    }
}

struct Harness {
    _dir: TempDir,
    engine: FlowEngine,
    delivery: Arc<FakeDelivery>,
}

fn harness(template_present: bool, fail_photo: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    if template_present {
        RgbImage::from_pixel(400, 200, Color::WHITE.rgb())
            .save(dir.path().join("bot.jpeg"))
            .unwrap();
    }

    let mut config = RenderConfig::default();
    config.base_dir = dir.path().to_path_buf();
    config.time_format = PATTERN.to_string();
    config.amount.y = 20;
    config.time.y = 120;

    let delivery = Arc::new(FakeDelivery {
        fail_photo,
        ..FakeDelivery::default()
    });
    let engine = FlowEngine::new(
        Arc::new(FixedConfigProvider(config)),
        Arc::clone(&delivery) as _,
    );
    Harness {
        _dir: dir,
        engine,
        delivery,
    }
}

#[tokio::test]
async fn full_dialogue_delivers_a_photo_and_returns_to_idle() {
    let h = harness(true, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();
    // The time prompt carries the live pattern and a worked example.
    let prompt = h.delivery.last_text();
    assert!(prompt.contains(PATTERN));
    assert!(prompt.contains("2025/10/16 16:42:14"));

    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();

    let photos = h.delivery.photos.lock().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].chat, CHAT);
    assert!(photos[0].existed);
    assert!(!photos[0].caption.is_empty());
    // The artifact dies with the delivery attempt.
    assert!(!photos[0].path.exists());
    drop(photos);

    // Back to idle: free text no longer belongs to this flow.
    let before = h.delivery.text_count();
    h.engine.handle(CHAT, "999").await.unwrap();
    assert_eq!(h.delivery.text_count(), before);
}

#[tokio::test]
async fn invalid_amount_reprompts_without_advancing() {
    let h = harness(true, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "not a number").await.unwrap();
    h.engine.handle(CHAT, "1.2.3").await.unwrap();

    // Still awaiting an amount: a valid one moves to the time prompt.
    h.engine.handle(CHAT, "320,5").await.unwrap();
    assert!(h.delivery.last_text().contains(PATTERN));
    assert!(h.delivery.photos.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_time_reprompts_without_losing_the_amount() {
    let h = harness(true, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();
    h.engine.handle(CHAT, "yesterday at noon").await.unwrap();
    assert!(h.delivery.last_text().contains(PATTERN));
    assert!(h.delivery.photos.lock().unwrap().is_empty());

    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();
    assert_eq!(h.delivery.photos.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_clears_the_dialogue() {
    let h = harness(true, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "/cancel").await.unwrap();

    let before = h.delivery.text_count();
    h.engine.handle(CHAT, "320").await.unwrap();
    assert_eq!(h.delivery.text_count(), before);
}

#[tokio::test]
async fn start_greets_and_resets_any_open_dialogue() {
    let h = harness(true, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();
    h.engine.handle(CHAT, "/start").await.unwrap();
    assert!(h.delivery.last_text().contains("/generate"));

    // The open time step was abandoned.
    let before = h.delivery.text_count();
    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();
    assert_eq!(h.delivery.text_count(), before);
}

#[tokio::test]
async fn conversations_are_isolated() {
    let h = harness(true, false);
    let other: ChatId = 200;

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(other, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();

    // The other chat is still on its amount step.
    h.engine.handle(other, "bogus").await.unwrap();
    let texts = h.delivery.texts();
    let (_, last_for_other) = texts.iter().rev().find(|(c, _)| *c == other).unwrap();
    assert!(!last_for_other.contains(PATTERN));

    h.engine.handle(other, "50").await.unwrap();
    h.engine.handle(other, "2025/10/16 16:42:14").await.unwrap();
    let photos = h.delivery.photos.lock().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].chat, other);
}

#[tokio::test]
async fn render_failure_reports_and_clears_the_dialogue() {
    let h = harness(false, false);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();
    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();

    assert!(h.delivery.photos.lock().unwrap().is_empty());
    assert!(h.delivery.last_text().contains("/generate"));

    // State is cleared: the same time text now falls on deaf ears.
    let before = h.delivery.text_count();
    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();
    assert_eq!(h.delivery.text_count(), before);
}

#[tokio::test]
async fn failed_delivery_still_deletes_the_artifact_and_clears_state() {
    let h = harness(true, true);

    h.engine.handle(CHAT, "/generate").await.unwrap();
    h.engine.handle(CHAT, "320").await.unwrap();
    let result = h.engine.handle(CHAT, "2025/10/16 16:42:14").await;
    assert!(result.is_err());

    let photos = h.delivery.photos.lock().unwrap();
    assert_eq!(photos.len(), 1);
    assert!(photos[0].existed);
    assert!(!photos[0].path.exists());
    drop(photos);

    let before = h.delivery.text_count();
    h.engine.handle(CHAT, "2025/10/16 16:42:14").await.unwrap();
    assert_eq!(h.delivery.text_count(), before);
}
