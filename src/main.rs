//! Sensor-node firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  KvStore (NVS)     SystemClock      UartSocket + uart-rx thread│
//! │  (Config+Storage)  (Clock)          (LineSocket, LineAssembler)│
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Engine<NodePayload>: heartbeat · link                 │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  edge-executor: dispatcher task · heartbeat cadence task       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::Result;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::uart_port_t;
use log::{info, warn};

use sensornode::adapters::kv::KvStore;
use sensornode::adapters::time::SystemClock;
use sensornode::adapters::uart::{UartSocket, spawn_reader};
use sensornode::app::NodePayload;
use sensornode::app::heartbeat::{self, HeartbeatCtx};
use sensornode::app::link::{self, LinkCtx};
use sensornode::config::NodeConfig;
use sensornode::fsm::Engine;

/// UART1 carries the modem link.
const LINK_UART_PORT: uart_port_t = 1;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  sensornode v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut kv = KvStore::new(EspDefaultNvsPartition::take()?);
    let config = sensornode::app::load_or_init_config(&mut kv).unwrap_or_else(|e| {
        warn!("Config unavailable ({e}), using defaults");
        NodeConfig::default()
    });

    // ── 3. Modem UART ─────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(config.link_baud)),
    )?;
    let (tx, rx) = uart.into_split();
    let socket = UartSocket::new(config.link_device.clone(), LINK_UART_PORT, tx);
    let link_open = socket.open_flag();

    // ── 4. Engine + machines ──────────────────────────────────
    let mut engine: Engine<NodePayload, SystemClock> = Engine::new(SystemClock::new());
    let hb = engine.create(
        "heartbeat",
        &heartbeat::TABLE,
        heartbeat::IDLE,
        HeartbeatCtx::new(&config),
    );
    let modem = engine.create(
        "link",
        &link::TABLE,
        link::CLOSED,
        LinkCtx::new(Box::new(socket), &config),
    );
    let _reader = spawn_reader(rx, link_open, engine.sender(), modem, link::LINE)?;

    for (handle, kick) in [(hb, heartbeat::ACTIVATE), (modem, link::OPEN)] {
        if !(engine.start(handle) && engine.send_event(handle, kick, None)) {
            anyhow::bail!("event queue full during boot");
        }
    }

    // ── 5. Run ────────────────────────────────────────────────
    let cadence = engine.sender();
    let period = Duration::from_millis(u64::from(config.heartbeat_period_ms));

    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    executor
        .spawn(async move {
            loop {
                async_io_mini::Timer::after(period).await;
                if !cadence.send(hb, heartbeat::ACTIVATE, None) {
                    warn!("heartbeat cadence: queue full");
                }
            }
        })
        .detach();
    executor.spawn(engine.run()).detach();

    info!("Boot complete");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
    Ok(())
}
