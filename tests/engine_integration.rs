use std::sync::Arc;
use std::time::Duration;

use js8_protocol::{DecodeResult, ScriptedDecoder};
use js8d::control::{Response, server};
use js8d::hardware::mock::{MockAudio, MockFactory};
use js8d::message::{Direction, MessageKind};
use js8d::store::{MessageFilter, StoredMessage};
use js8d::{AudioBufferPool, Config, Engine, Error};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

const RATE: u32 = 12_000;

fn station() -> Config {
    let mut config = Config::default();
    config.station.callsign = "N0CALL".into();
    config.station.grid = "EM12".into();
    config.station.heartbeat = false;
    config.engine.decoder = "null".into();
    config.hardware.gpio.enabled = true;
    config
}

fn build(config: Config, factory: MockFactory, pool: Arc<AudioBufferPool>) -> Engine {
    Engine::builder(config)
        .factory(Arc::new(factory))
        .pool(pool)
        .build()
        .unwrap()
}

/// Poll the store until `found` matches or `limit` of (virtual) time passes.
async fn wait_for(engine: &Engine, limit: Duration, found: impl Fn(&StoredMessage) -> bool) -> Option<StoredMessage> {
    let step = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    while waited < limit {
        let messages = engine.messages(&MessageFilter::default()).unwrap();
        if let Some(m) = messages.into_iter().find(|m| found(m)) {
            return Some(m);
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    None
}

async fn ask<W, R>(writer: &mut W, replies: &mut Lines<BufReader<R>>, line: &str) -> Response
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    let reply = replies.next_line().await.unwrap().unwrap();
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn test_full_transmit_queue_rejects_at_once() {
    let pool = Arc::new(AudioBufferPool::default());
    let mut config = station();
    config.engine.tx_queue_capacity = 1;
    let engine = build(config, MockFactory::new(Arc::clone(&pool), RATE), pool);
    engine.start().unwrap();

    engine.send("K1ABC", "HELLO").unwrap();
    let second = engine.send("K1ABC", "AGAIN");
    assert!(matches!(second, Err(Error::QueueFull)));
    assert_eq!(engine.status().tx_queue, 1);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loopback_broadcast_is_received() {
    let pool = Arc::new(AudioBufferPool::default());
    let audio = MockAudio::new(Arc::clone(&pool), RATE, RATE)
        .loopback(true)
        .chunk_size(16_384);
    let factory = MockFactory::new(Arc::clone(&pool), RATE).with_audio(audio);
    let mocks = factory.clone();

    let mut config = station();
    config.engine.submode = "turbo".into();
    config.engine.decoder = "tone".into();
    let engine = build(config, factory, pool);
    engine.start().unwrap();

    engine.send("", "CQ N0CALL XX").unwrap();

    let heard = wait_for(&engine, Duration::from_secs(30), |m| m.direction == Direction::Incoming).await;
    let heard = heard.expect("loopback decode");
    assert_eq!(heard.message.text, "CQ N0CALL XX");
    assert_eq!(heard.message.from, "N0CALL");
    assert_eq!(heard.kind, MessageKind::Broadcast);

    let sent = wait_for(&engine, Duration::from_secs(30), |m| m.direction == Direction::Outgoing).await;
    assert_eq!(sent.expect("outgoing record").kind, MessageKind::Broadcast);

    let incoming = engine
        .messages(&MessageFilter::default())
        .unwrap()
        .into_iter()
        .filter(|m| m.direction == Direction::Incoming)
        .count();
    assert_eq!(incoming, 1, "repeat decodes are suppressed");

    assert!(mocks.audio.played_len() > 0);
    assert_eq!(mocks.gpio.set_calls(), 2);
    assert!(!mocks.gpio.pin(0));

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_snr_query_gets_auto_reply() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let decoder = Arc::new(ScriptedDecoder::new(
        RATE as usize,
        vec![DecodeResult {
            message: "K1ABC: N0CALL SNR?".into(),
            snr: -12,
            frequency_offset: 1500.0,
            quality: 0.9,
            frame_type: 3,
        }],
    ));

    let engine = Engine::builder(station())
        .factory(Arc::new(factory))
        .pool(pool)
        .decoder(decoder.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    mocks.audio.inject(&vec![0.0; 3 * RATE as usize]);

    let reply = wait_for(&engine, Duration::from_secs(60), |m| m.kind == MessageKind::AutoReply).await;
    let reply = reply.expect("auto-reply sent");
    assert_eq!(reply.direction, Direction::Outgoing);
    assert_eq!(reply.message.to, "K1ABC");
    assert_eq!(reply.message.text, "SNR -12");

    let query = engine
        .messages(&MessageFilter::default())
        .unwrap()
        .into_iter()
        .find(|m| m.direction == Direction::Incoming)
        .expect("query recorded");
    assert_eq!(query.message.from, "K1ABC");
    assert_eq!(query.message.to, "N0CALL");
    assert_eq!(query.kind, MessageKind::Directed);
    assert!(decoder.calls() >= 1);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_goes_out_on_interval() {
    let pool = Arc::new(AudioBufferPool::default());
    let mut config = station();
    config.station.heartbeat = true;
    config.station.heartbeat_interval = 60;
    let engine = build(config, MockFactory::new(Arc::clone(&pool), RATE), pool);
    engine.start().unwrap();

    let beacon = wait_for(&engine, Duration::from_secs(90), |m| m.kind == MessageKind::Heartbeat).await;
    let beacon = beacon.expect("heartbeat sent");
    assert_eq!(beacon.message.text, "N0CALL EM12");
    assert!(beacon.message.to.is_empty());

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_cuts_transmission_short() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let engine = build(station(), factory, pool);
    engine.start().unwrap();

    engine.send("K1ABC", "LONG ONE").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(engine.status().ptt);
    assert!(mocks.gpio.pin(0));

    engine.stop().await.unwrap();
    assert!(!mocks.gpio.pin(0));
    assert!(!mocks.audio.is_output_running());
    assert!(engine.messages(&MessageFilter::default()).unwrap().is_empty());
}

#[tokio::test]
async fn test_control_session_against_running_engine() {
    let pool = Arc::new(AudioBufferPool::default());
    let engine = Arc::new(build(station(), MockFactory::new(Arc::clone(&pool), RATE), pool));
    engine.start().unwrap();

    let (client, stream) = tokio::io::duplex(8192);
    let session = tokio::spawn(server::handle_connection(stream, Arc::clone(&engine), CancellationToken::new()));
    let (reader, mut writer) = tokio::io::split(client);
    let mut replies = BufReader::new(reader).lines();

    let status = ask(&mut writer, &mut replies, "STATUS").await;
    assert_eq!(status.data.unwrap()["running"], true);

    let sent = ask(&mut writer, &mut replies, "SEND:K1ABC hello there").await;
    assert!(sent.success);
    assert_eq!(sent.data.unwrap()["to"], "K1ABC");

    let bad = ask(&mut writer, &mut replies, "SEND:K1ABC what?").await;
    assert!(!bad.success);

    let radio = ask(&mut writer, &mut replies, "RADIO").await;
    assert_eq!(radio.data.unwrap()["info"]["model"], "Dummy");

    let tuned = ask(&mut writer, &mut replies, "FREQUENCY:7078000").await;
    assert_eq!(tuned.data.unwrap()["frequency"], 7_078_000);

    assert!(!ask(&mut writer, &mut replies, "NOPE").await.success);
    assert!(ask(&mut writer, &mut replies, "QUIT").await.success);

    session.await.unwrap().unwrap();
    assert!(replies.next_line().await.unwrap().is_none());

    engine.stop().await.unwrap();
}

fn scripted(min_samples: usize, texts: &[&str]) -> Arc<ScriptedDecoder> {
    let results = texts
        .iter()
        .map(|text| DecodeResult {
            message: text.to_string(),
            snr: -5,
            frequency_offset: 1200.0,
            quality: 0.8,
            frame_type: 3,
        })
        .collect();
    Arc::new(ScriptedDecoder::new(min_samples, results))
}

fn incoming(engine: &Engine) -> Vec<StoredMessage> {
    engine
        .messages(&MessageFilter::default())
        .unwrap()
        .into_iter()
        .filter(|m| m.direction == Direction::Incoming)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_idle_tick_decodes_short_buffer_then_clears() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let decoder = scripted(RATE as usize / 2, &["K1ABC: N0CALL HELLO"]);
    let engine = Engine::builder(station())
        .factory(Arc::new(factory))
        .pool(pool)
        .decoder(decoder.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    // One second of audio: below the batch threshold.
    mocks.audio.inject(&vec![0.0; RATE as usize]);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(decoder.calls(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(decoder.calls(), 1);
    let heard = incoming(&engine);
    assert_eq!(heard.len(), 1);
    assert_eq!(heard[0].message.from, "K1ABC");
    assert_eq!(heard[0].message.text, "HELLO");

    // Cleared after the idle decode, so later ticks have nothing to decode.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(decoder.calls(), 1);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_full_receive_queue_drops_without_retry() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let mut config = station();
    config.engine.rx_queue_capacity = 1;
    let decoder = scripted(RATE as usize, &["K1ABC: N0CALL FIRST", "W1AW: N0CALL SECOND"]);
    let engine = Engine::builder(config)
        .factory(Arc::new(factory))
        .pool(pool)
        .decoder(decoder.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    mocks.audio.inject(&vec![0.0; 3 * RATE as usize]);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(decoder.calls() >= 2, "idle tick decoded the buffer again");
    let heard = incoming(&engine);
    assert_eq!(heard.len(), 1);
    assert_eq!(heard[0].message.from, "K1ABC");

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unsendable_beacon_never_keys_transmitter() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let mut config = station();
    config.station.callsign = "W1/N0CAL".into();
    config.station.heartbeat = true;
    config.station.heartbeat_interval = 60;
    let engine = build(config, factory, pool);
    engine.start().unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(mocks.gpio.set_calls(), 0);
    assert_eq!(mocks.audio.played_len(), 0);
    assert!(engine.messages(&MessageFilter::default()).unwrap().is_empty());

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unsendable_auto_reply_is_skipped() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let decoder = scripted(RATE as usize, &["W1/K1ABC: N0CALL SNR?"]);
    let engine = Engine::builder(station())
        .factory(Arc::new(factory))
        .pool(pool)
        .decoder(decoder)
        .build()
        .unwrap();
    engine.start().unwrap();

    mocks.audio.inject(&vec![0.0; 3 * RATE as usize]);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let messages = engine.messages(&MessageFilter::default()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, Direction::Incoming);
    assert_eq!(messages[0].message.from, "W1/K1ABC");
    assert_eq!(mocks.gpio.set_calls(), 0);
    assert_eq!(engine.status().tx_queue, 0);

    engine.stop().await.unwrap();
}

/// Records which thread each decode ran on.
#[derive(Default)]
struct ThreadDecoder {
    threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
}

impl js8_protocol::Decoder for ThreadDecoder {
    fn decode(&self, _samples: &[f32], _sample_rate: u32) -> Vec<DecodeResult> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        Vec::new()
    }
}

#[tokio::test]
async fn test_decode_runs_off_the_runtime_thread() {
    let pool = Arc::new(AudioBufferPool::default());
    let factory = MockFactory::new(Arc::clone(&pool), RATE);
    let mocks = factory.clone();
    let decoder = Arc::new(ThreadDecoder::default());
    let engine = Engine::builder(station())
        .factory(Arc::new(factory))
        .pool(pool)
        .decoder(decoder.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    mocks.audio.inject(&vec![0.0; 3 * RATE as usize]);
    let runtime_thread = std::thread::current().id();
    let mut waited = 0;
    while decoder.threads.lock().unwrap().is_empty() && waited < 100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }

    let threads = decoder.threads.lock().unwrap().clone();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|&id| id != runtime_thread));

    engine.stop().await.unwrap();
}
