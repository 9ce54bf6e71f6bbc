use crate::error::{ConnectError, DisconnectError, PublishError};
use crate::publisher::{DeliveryOutcome, Publisher, QoS};
use std::io::{self, Stdout, Write};

/// Publisher that writes each payload as a line to a writer instead of a
/// broker. Delivery is confirmed once the line is flushed.
#[derive(Debug)]
pub struct ConsolePublisher<W: Write + Send = Stdout> {
    out: W,
    lines_written: u64,
    open: bool,
}

impl ConsolePublisher<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsolePublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            lines_written: 0,
            open: false,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Publisher for ConsolePublisher<W> {
    fn connect(&mut self) -> Result<(), ConnectError> {
        self.out.flush()?;
        self.open = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DisconnectError> {
        self.open = false;
        self.out.flush()?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    // Topic and delivery options have no meaning for a plain line sink.
    fn publish(
        &mut self,
        _topic: &str,
        payload: &[u8],
        _qos: QoS,
        _retained: bool,
    ) -> Result<DeliveryOutcome, PublishError> {
        self.out.write_all(payload)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.lines_written += 1;
        Ok(DeliveryOutcome::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_line_per_publish() {
        let mut console = ConsolePublisher::new(Vec::new());
        assert!(!console.is_connected());
        console.connect().unwrap();
        assert!(console.is_connected());
        let outcome = console
            .publish("local/sim/a", b"1000 5", QoS::AtMostOnce, false)
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Confirmed);
        console
            .publish("local/sim/a", b"3000 6", QoS::AtMostOnce, false)
            .unwrap();
        console.disconnect().unwrap();
        assert!(!console.is_connected());

        assert_eq!(console.lines_written(), 2);
        assert_eq!(console.into_inner(), b"1000 5\n3000 6\n".to_vec());
    }
}
