//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements         | Connects to                 |
//! |--------------|--------------------|-----------------------------|
//! | `kv`         | StoragePort        | NVS / in-memory map         |
//! |              | ConfigPort         |                             |
//! | `line`       | (EventSender feed) | socket RX byte streams      |
//! | `mem_socket` | LineSocket         | in-memory transcript (host) |
//! | `time`       | Clock              | ESP32 system timer / Instant|
//! | `uart`       | LineSocket         | ESP32 UART (espidf only)    |

pub mod kv;
pub mod line;
pub mod mem_socket;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
