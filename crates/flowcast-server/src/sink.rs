//! CSV packet log

use flowcast_core::{PacketSink, ParsedPacket};
use parking_lot::Mutex;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column header
pub const CSV_HEADER: &str =
    "timestamp,source_ip,destination_ip,source_port,destination_port,protocol,traffic_type,packet_size,priority";

const MISSING: &str = "N/A";

/// Appends one row per classified packet
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

fn field<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

/// Render one packet as a CSV row (no trailing newline)
pub fn format_row(packet: &ParsedPacket) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        packet.timestamp.to_rfc3339(),
        field(packet.source_ip),
        field(packet.destination_ip),
        field(packet.source_port),
        field(packet.destination_port),
        field(packet.protocol),
        packet.category,
        packet.size,
        packet.priority,
    )
}

impl CsvSink {
    /// Create (truncate) `path` and write the header
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{CSV_HEADER}")?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "writing packets to csv");
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    /// Flush buffered rows
    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

impl PacketSink for CsvSink {
    fn accept(&self, packet: &ParsedPacket) {
        let row = format_row(packet);
        if let Err(e) = writeln!(self.writer.lock(), "{row}") {
            tracing::warn!(path = %self.path.display(), error = %e, "csv write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::fixture::{ethernet_frame, FrameBuilder};
    use flowcast_core::TrafficClassifier;

    fn classified(frame: flowcast_core::RawFrame) -> ParsedPacket {
        let mut packet = ParsedPacket::parse(&frame).unwrap();
        TrafficClassifier::new().classify_into(&mut packet);
        packet
    }

    #[test]
    fn test_rows() {
        let tcp = classified(FrameBuilder::tcp([192, 168, 1, 5], [10, 0, 0, 1], 50000, 22).build());
        let row = format_row(&tcp);
        assert!(row.ends_with(",192.168.1.5,10.0.0.1,50000,22,6,file,54,1"), "{row}");

        let icmp = classified(FrameBuilder::icmp([192, 168, 1, 5], [10, 0, 0, 1], 8, 0).build());
        assert!(format_row(&icmp).ends_with(",N/A,N/A,1,unknown,42,0"));

        let arp = classified(ethernet_frame(0x0806, &[0u8; 28]));
        assert!(format_row(&arp).ends_with(",N/A,N/A,N/A,N/A,N/A,unknown,42,0"));
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packets.csv");
        let sink = CsvSink::create(&path).unwrap();
        sink.accept(&classified(FrameBuilder::udp([1, 2, 3, 4], [5, 6, 7, 8], 40000, 5060).build()));
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(",1.2.3.4,5.6.7.8,40000,5060,17,voice,42,3"));
    }
}
