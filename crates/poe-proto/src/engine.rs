//! Protocol engine: sequences one logical command end to end (spec.md §4.C).
//!
//! 1. Build the frame and assign the next ECHO.
//! 2. If the previous command issued on this chip was also a COMMAND,
//!    wait the inter-command delay before transmitting.
//! 3. Acquire the bus lock, write, sleep the command-class settle delay,
//!    read the reply, release the lock (`BusTransport::transact`).
//! 4. Validate key/echo/checksum. On failure, drain + settle + retry, up
//!    to `COMM_RETRY_TIMES` total attempts.
//! 5. On success, the caller (the chip driver) parses the reply.

use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use crate::error::PoeError;
use crate::frame::{EchoCounter, Frame, Key};
use crate::transport::BusTransport;

pub const COMM_RETRY_TIMES: u32 = 6;
/// Mandatory gap between two back-to-back COMMAND-keyed messages.
pub const INTER_COMMAND_DELAY: Duration = Duration::from_millis(30);

/// Settle delay applied after a transmitted frame, keyed by command class.
#[derive(Debug, Clone, Copy)]
pub enum SettleClass {
    ResetChip,
    RestoreFactoryDefault,
    SaveSystemSettings,
    Default,
}

impl SettleClass {
    pub fn delay(self) -> Duration {
        match self {
            SettleClass::ResetChip => Duration::from_millis(300),
            SettleClass::RestoreFactoryDefault => Duration::from_millis(100),
            SettleClass::SaveSystemSettings => Duration::from_millis(50),
            SettleClass::Default => Duration::from_millis(30),
        }
    }
}

/// Per-chip protocol engine state: the ECHO counter and the key of the
/// last command issued, both used to enforce ordering/timing invariants.
pub struct ProtocolEngine {
    transport: BusTransport,
    echo: Mutex<EchoCounter>,
    last_sent_key: Mutex<Option<Key>>,
}

impl ProtocolEngine {
    pub fn new(transport: BusTransport) -> Self {
        ProtocolEngine {
            transport,
            echo: Mutex::new(EchoCounter::new()),
            last_sent_key: Mutex::new(None),
        }
    }

    /// Runs one command to completion: build, (maybe) delay, transact with
    /// retry, validate. Returns the validated reply frame for the caller
    /// to hand to a parser. `rest` is everything after KEY/ECHO (SUB
    /// onward); the engine draws the next ECHO value and assembles the
    /// full command itself.
    /// Drains a stray reply on the bus without issuing a command, used
    /// by callers that need to flush stale controller output before
    /// their first real transaction (spec.md §4.E platform init step 1).
    pub fn flush(&self) {
        self.transport.drain_and_settle();
    }

    pub fn run(&self, key: Key, rest: &[u8], settle: SettleClass) -> Result<Frame, PoeError> {
        let echo = self.echo.lock().expect("echo counter poisoned").next();
        let mut full = Vec::with_capacity(2 + rest.len());
        full.push(key.to_byte());
        full.push(echo);
        full.extend_from_slice(rest);
        let frame = Frame::build(&full)?;

        {
            let mut last = self.last_sent_key.lock().expect("last key mutex poisoned");
            if *last == Some(Key::Command) && key == Key::Command {
                std::thread::sleep(INTER_COMMAND_DELAY);
            }
            *last = Some(key);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.transport.transact(&frame, settle.delay()) {
                Ok(reply) => match reply.validate(&frame) {
                    Ok(()) => return Ok(reply),
                    Err(e) => {
                        warn!(attempt, error = %e, "protocol validation failed, retrying");
                        if attempt >= COMM_RETRY_TIMES {
                            return Err(PoeError::transport(format!(
                                "protocol validation failed after {attempt} attempts: {e}"
                            )));
                        }
                        self.transport.drain_and_settle();
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "bus transaction failed, retrying");
                    if attempt >= COMM_RETRY_TIMES {
                        return Err(PoeError::transport(format!(
                            "bus transaction failed after {attempt} attempts: {e}"
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBus;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn echo_reply(sent: &Frame, key_byte: u8) -> Frame {
        let mut buf = [crate::frame::MSG_PAD_BYTE; crate::frame::MSG_LEN];
        buf[crate::frame::OFFSET_KEY] = key_byte;
        buf[crate::frame::OFFSET_ECHO] = sent.echo();
        let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
        buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
        buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
        Frame(buf)
    }

    #[test]
    fn succeeds_first_try_with_well_formed_reply() {
        let bus = MockBus::with_responder(|sent| echo_reply(sent, Key::Report.to_byte()));
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let reply = engine.run(Key::Command, &[0x07, 0x55], SettleClass::Default).unwrap();
        assert_eq!(reply.key(), Key::Report.to_byte());
    }

    #[test]
    fn retries_on_bad_echo_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let bus = MockBus::with_responder(move |sent| {
            let n = calls2.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // Wrong echo on the first attempt.
                let mut bad = echo_reply(sent, Key::Report.to_byte());
                bad.0[crate::frame::OFFSET_ECHO] ^= 0xFF;
                // recompute checksum isn't needed; echo mismatch triggers first
                bad
            } else {
                echo_reply(sent, Key::Report.to_byte())
            }
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let reply = engine.run(Key::Command, &[0x07, 0x55], SettleClass::Default).unwrap();
        assert_eq!(reply.key(), Key::Report.to_byte());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fails_permanently_after_max_retries() {
        let bus = MockBus::with_responder(|sent| {
            let mut bad = echo_reply(sent, Key::Report.to_byte());
            bad.0[crate::frame::OFFSET_ECHO] ^= 0xFF;
            bad
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let err = engine.run(Key::Command, &[0x07, 0x55], SettleClass::Default).unwrap_err();
        assert!(matches!(err, PoeError::Transport(_)));
    }
}
