use std::io::{self, Write};

use crate::actions::ActionOutcome;
use crate::handlers::ArchiveRecord;

const NAME_WIDTH: usize = 50;
const SIZE_WIDTH: usize = 15;
const CRC_WIDTH: usize = 10;
const RULE_WIDTH: usize = 90;

/// Render the record table with its `Total:` footer.
pub fn render_table(records: &[ArchiveRecord]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut table = String::new();

    table.push_str(&row("Name", "Compressed", "Uncompressed", "CRC32"));
    table.push_str(&rule);
    table.push('\n');

    for (i, record) in records.iter().enumerate() {
        let name = if record.name.is_empty() {
            format!("record_{i}")
        } else {
            record.name.clone()
        };
        let crc = if record.crc32 == 0 {
            "-".to_string()
        } else {
            format!("{:08X}", record.crc32)
        };
        table.push_str(&row(
            &name,
            &record.display_compressed_size().to_string(),
            &record.uncompressed_size.to_string(),
            &crc,
        ));
    }

    table.push_str(&rule);
    table.push('\n');
    table.push_str(&format!("Total: {} file(s)\n", records.len()));
    table
}

fn row(name: &str, compressed: &str, uncompressed: &str, crc: &str) -> String {
    format!(
        "{:<nw$} | {:>sw$} | {:>sw$} | {:>cw$}\n",
        name,
        compressed,
        uncompressed,
        crc,
        nw = NAME_WIDTH,
        sw = SIZE_WIDTH,
        cw = CRC_WIDTH,
    )
}

pub fn run(records: &[ArchiveRecord], out: &mut dyn Write) -> io::Result<ActionOutcome> {
    writeln!(out, "Archive contents:")?;
    out.write_all(render_table(records).as_bytes())?;
    tracing::info!("listed {} records", records.len());
    Ok(ActionOutcome::Listed {
        records: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, compressed: u64, stream: u64, size: u64, crc32: u32) -> ArchiveRecord {
        ArchiveRecord {
            name: name.to_string(),
            compressed_size: compressed,
            uncompressed_size: size,
            crc32,
            stream_size: stream,
            is_dir: false,
        }
    }

    #[test]
    fn test_table_without_crcs() {
        let records = vec![
            record("a.txt", 0, 512, 5, 0),
            record("b.txt", 0, 1024, 6, 0),
            record("c.txt", 0, 2048, 7, 0),
        ];
        let table = render_table(&records);
        let lines: Vec<&str> = table.lines().collect();

        // header, rule, 3 rows, rule, footer
        assert_eq!(lines.len(), 7);
        for line in &lines[2..5] {
            assert!(line.ends_with(" -"), "row without CRC dash: {line}");
        }
        assert!(lines[2].contains(" 512 |"));
        assert_eq!(lines[6], "Total: 3 file(s)");
    }

    #[test]
    fn test_table_row_format() {
        let records = vec![record("", 100, 0, 250, 0xDEADBEEF)];
        let table = render_table(&records);
        let expected_row = format!(
            "{:<50} | {:>15} | {:>15} | {:>10}",
            "record_0", 100, 250, "DEADBEEF"
        );
        assert_eq!(table.lines().nth(2).unwrap(), expected_row);
        assert_eq!(table.lines().nth(1).unwrap().len(), 90);
    }

    #[test]
    fn test_run_writes_table() {
        let mut out = Vec::new();
        let outcome = run(&[record("x", 1, 1, 1, 1)], &mut out).unwrap();
        assert_eq!(outcome, ActionOutcome::Listed { records: 1 });
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Archive contents:\nName"));
        assert!(text.contains("00000001"));
    }
}
