//! Field extraction for HDFS-formatted log lines.
//!
//! HDFS daemons write lines of the form
//! `YYMMDD HHMMSS [thread] LEVEL [component]: message`. Extraction is
//! best-effort. A line with fewer than six space-separated tokens yields no
//! fields. Otherwise the first two tokens become the date and time, and the
//! thread, component and block id are filled only where they match.

/// Structured fields extracted from a log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFields {
    pub hdfs_date: Option<String>,
    pub hdfs_time: Option<String>,
    pub thread_id: Option<u32>,
    pub hdfs_component: Option<String>,
    pub block_id: Option<String>,
}

const BLOCK_PREFIX: &str = "blk_";
const BLOCK_MIN_DIGITS: usize = 10;
const BLOCK_MAX_DIGITS: usize = 19;

impl LogFields {
    /// Extracts whatever fields the line carries.
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.splitn(6, ' ').collect();
        if parts.len() < 6 {
            return Self::default();
        }

        let thread_id = parts[2]
            .strip_prefix('[')
            .and_then(|p| p.strip_suffix(']'))
            .and_then(|p| p.parse().ok());

        let hdfs_component = parts[4]
            .strip_prefix('[')
            .and_then(|p| p.strip_suffix("]:"))
            .map(str::to_string);

        Self {
            hdfs_date: Some(parts[0].to_string()),
            hdfs_time: Some(parts[1].to_string()),
            thread_id,
            hdfs_component,
            block_id: find_block_id(line),
        }
    }
}

/// Returns the first `blk_<-?digits>` token with 10 to 19 digits.
fn find_block_id(line: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(BLOCK_PREFIX) {
        let start = search_from + offset;
        let mut cursor = start + BLOCK_PREFIX.len();
        let rest = &line[cursor..];
        if rest.starts_with('-') {
            cursor += 1;
        }
        let digits = line[cursor..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .take(BLOCK_MAX_DIGITS)
            .count();
        if digits >= BLOCK_MIN_DIGITS {
            return Some(line[start..cursor + digits].to_string());
        }
        search_from = start + BLOCK_PREFIX.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_hdfs_line() {
        let line = "081109 203615 [148] INFO [dfs.DataNode$PacketResponder]: \
                    PacketResponder 1 for block blk_38865049064139660 terminating";
        let fields = LogFields::parse(line);
        assert_eq!(fields.hdfs_date.as_deref(), Some("081109"));
        assert_eq!(fields.hdfs_time.as_deref(), Some("203615"));
        assert_eq!(fields.thread_id, Some(148));
        assert_eq!(
            fields.hdfs_component.as_deref(),
            Some("dfs.DataNode$PacketResponder")
        );
        assert_eq!(fields.block_id.as_deref(), Some("blk_38865049064139660"));
    }

    #[test]
    fn keeps_negative_block_sign() {
        let line = "081109 203615 [7] WARNING [dfs.FSNamesystem]: Exception in receiveBlock for blk_-1608999687919862906";
        let fields = LogFields::parse(line);
        assert_eq!(fields.block_id.as_deref(), Some("blk_-1608999687919862906"));
    }

    #[test]
    fn short_block_ids_are_ignored() {
        let line = "081109 203615 [7] INFO [dfs.DataNode]: saw blk_123 then blk_1234567890";
        let fields = LogFields::parse(line);
        assert_eq!(fields.block_id.as_deref(), Some("blk_1234567890"));
    }

    #[test]
    fn malformed_brackets_leave_fields_empty() {
        let line = "081109 203615 148 INFO dfs.DataNode: no brackets here";
        let fields = LogFields::parse(line);
        assert_eq!(fields.hdfs_date.as_deref(), Some("081109"));
        assert_eq!(fields.thread_id, None);
        assert_eq!(fields.hdfs_component, None);
        assert_eq!(fields.block_id, None);
    }

    #[test]
    fn any_six_token_line_gets_date_and_time() {
        let fields = LogFields::parse("disk almost full on data node");
        assert_eq!(fields.hdfs_date.as_deref(), Some("disk"));
        assert_eq!(fields.hdfs_time.as_deref(), Some("almost"));
        assert_eq!(fields.thread_id, None);
        assert_eq!(fields.hdfs_component, None);
    }

    #[test]
    fn short_lines_yield_nothing() {
        assert_eq!(LogFields::parse("disk full"), LogFields::default());
        assert_eq!(LogFields::parse(""), LogFields::default());
    }
}
