//! Line classification
//!
//! Matches a single log line against the simulator's line grammars. Matching is
//! purely local to the line: no state survives between calls.
//!
//! ## Base grammar
//! `[<sim-ms>:]HH:MM:SS.fff <ws> Node:<id> <ws> :<message>`
//!
//! ## Payload grammars
//! - Reception: `Incoming DIO (id, ver, rank) = (<instance>,...) from:<ipv6>`
//! - Announcement: `RPL: DAG: <dag> ... Parent: <hex|none>, ... Pref <Y|N>`
//! - Neighbour table: `RPL Neighbour Set for Instance ID: <instance>`, entry
//!   lines carrying `Parent:`/`Pref`, and `--- End of Table`

use crate::types::{BaseRecord, NodeId};

const NODE_MARKER: &str = "Node:";
const DIO_MARKER: &str = "Incoming DIO";
const DIO_TUPLE_MARKER: &str = "= (";
const FROM_MARKER: &str = "from:";
const DAG_MARKER: &str = "RPL: DAG:";
const PARENT_MARKER: &str = "Parent:";
const PREF_MARKER: &str = "Pref";
const TABLE_START_MARKER: &str = "RPL Neighbour Set for Instance ID:";
const TABLE_END_MARKER: &str = "--- End of Table";

/// What the message part of a line turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePayload {
    /// A DIO received from `sender` for `instance`
    Reception { instance: String, sender: NodeId },
    /// A `RPL: DAG:` parent line; `preferred` is the `Pref` marker
    Announcement {
        dag: String,
        parent: Option<NodeId>,
        preferred: bool,
    },
    /// Opening line of a neighbour table
    TableStart { instance: String },
    /// A neighbour-table row
    TableEntry {
        parent: Option<NodeId>,
        preferred: bool,
    },
    /// Closing line of a neighbour table
    TableEnd,
    /// Matched a grammar anchor but a token failed to parse
    Discarded(&'static str),
    /// No payload grammar applies
    Other,
}

/// A line that matched the base grammar
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedLine {
    pub record: BaseRecord,
    pub payload: LinePayload,
}

/// Stateless line classifier
pub struct LineClassifier;

impl LineClassifier {
    /// Classify one raw line
    ///
    /// Returns `None` when the line does not carry a timestamp and node id.
    pub fn classify(line: &str) -> Option<ClassifiedLine> {
        let record = Self::parse_base(line)?;
        let payload = Self::classify_message(&record.message);
        Some(ClassifiedLine { record, payload })
    }

    /// Parse the timestamp / node prefix of a line
    pub fn parse_base(line: &str) -> Option<BaseRecord> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (time_token, rest) = line.split_once(char::is_whitespace)?;
        let (absolute_time, timestamp_text) = Self::parse_timestamp(time_token)?;

        let rest = rest.trim_start().strip_prefix(NODE_MARKER)?;
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let node_id: NodeId = rest[..digits_end].parse().ok()?;

        let remainder = rest[digits_end..].trim_start();
        let message = remainder.strip_prefix(':').unwrap_or(remainder);

        Some(BaseRecord {
            absolute_time,
            timestamp_text: timestamp_text.to_string(),
            node_id,
            message: message.to_string(),
        })
    }

    /// Parse `[<sim-ms>:]H+:MM:SS[.fff]` into seconds and the `H:MM:SS.fff` text
    fn parse_timestamp(token: &str) -> Option<(f64, &str)> {
        let text = match token.matches(':').count() {
            2 => token,
            3 => {
                let (counter, text) = token.split_once(':')?;
                if !all_digits(counter) {
                    return None;
                }
                text
            }
            _ => return None,
        };

        let mut parts = text.split(':');
        let hours = parts.next()?;
        let minutes = parts.next()?;
        let seconds = parts.next()?;

        if !all_digits(hours) || !all_digits(minutes) || minutes.len() != 2 {
            return None;
        }
        if !seconds.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let hours: f64 = hours.parse().ok()?;
        let minutes: f64 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;

        Some((hours * 3600.0 + minutes * 60.0 + seconds, text))
    }

    /// Classify the free-text message of a base record
    pub fn classify_message(message: &str) -> LinePayload {
        if let Some(idx) = message.find(TABLE_START_MARKER) {
            let after = &message[idx + TABLE_START_MARKER.len()..];
            return match leading_token(after, |c| c.is_ascii_digit()) {
                Some(instance) => LinePayload::TableStart {
                    instance: instance.to_string(),
                },
                None => LinePayload::Discarded("table start without instance id"),
            };
        }

        if message.contains(TABLE_END_MARKER) {
            return LinePayload::TableEnd;
        }

        if let Some(idx) = message.find(DIO_MARKER) {
            return Self::parse_reception(&message[idx + DIO_MARKER.len()..]);
        }

        if let Some(idx) = message.find(DAG_MARKER) {
            let after = &message[idx + DAG_MARKER.len()..];
            let Some(dag) = leading_token(after, |c| c.is_ascii_hexdigit()) else {
                return LinePayload::Discarded("DAG line without DAG id");
            };
            return match Self::parse_parent_and_preference(message) {
                Ok((parent, preferred)) => LinePayload::Announcement {
                    dag: dag.to_string(),
                    parent,
                    preferred,
                },
                Err(reason) => LinePayload::Discarded(reason),
            };
        }

        if message.contains(PARENT_MARKER) {
            return match Self::parse_parent_and_preference(message) {
                Ok((parent, preferred)) => LinePayload::TableEntry { parent, preferred },
                Err(reason) => LinePayload::Discarded(reason),
            };
        }

        LinePayload::Other
    }

    /// Parse the remainder of an `Incoming DIO` line
    fn parse_reception(after_marker: &str) -> LinePayload {
        let Some(tuple_idx) = after_marker.find(DIO_TUPLE_MARKER) else {
            return LinePayload::Discarded("DIO line without (id, ver, rank) tuple");
        };
        let tuple = &after_marker[tuple_idx + DIO_TUPLE_MARKER.len()..];
        let instance_end = tuple.find(',').unwrap_or(tuple.len());
        let instance = tuple[..instance_end].trim();
        if !all_digits(instance) {
            return LinePayload::Discarded("DIO line with non-numeric instance id");
        }

        let Some(from_idx) = tuple.find(FROM_MARKER) else {
            return LinePayload::Discarded("DIO line without sender address");
        };
        let address = &tuple[from_idx + FROM_MARKER.len()..];
        let address_end = address
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == ':'))
            .unwrap_or(address.len());
        let address = &address[..address_end];

        match address.rsplit(':').next().and_then(parse_hex_node) {
            Some(sender) => LinePayload::Reception {
                instance: instance.to_string(),
                sender,
            },
            None => LinePayload::Discarded("DIO sender address without hex node id"),
        }
    }

    /// Extract the `Parent:` value and the `Pref` marker from a parent line
    fn parse_parent_and_preference(
        message: &str,
    ) -> std::result::Result<(Option<NodeId>, bool), &'static str> {
        let idx = message.find(PARENT_MARKER).ok_or("missing Parent field")?;
        let after = &message[idx + PARENT_MARKER.len()..];
        let token = leading_token(after, |c| c.is_ascii_alphanumeric())
            .ok_or("empty Parent field")?;

        let parent = if token.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(parse_hex_node(token).ok_or("Parent field is not a hex node id")?)
        };

        let preferred = Self::parse_preference(message).ok_or("missing Pref marker")?;
        Ok((parent, preferred))
    }

    /// Find `Pref <ws> Y|N`; `Some(true)` only for `Y`
    fn parse_preference(message: &str) -> Option<bool> {
        for (idx, _) in message.match_indices(PREF_MARKER) {
            let after = &message[idx + PREF_MARKER.len()..];
            let value = after.trim_start();
            if value.len() == after.len() {
                // `Pref` must be followed by whitespace (rules out `Preferred`)
                continue;
            }
            match value.chars().next() {
                Some('Y') => return Some(true),
                Some('N') => return Some(false),
                _ => continue,
            }
        }
        None
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// First run of characters satisfying `accept` after leading whitespace
fn leading_token(s: &str, accept: impl Fn(char) -> bool) -> Option<&str> {
    let s = s.trim_start();
    let end = s.find(|c: char| !accept(c)).unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

fn parse_hex_node(token: &str) -> Option<NodeId> {
    if token.is_empty() {
        return None;
    }
    NodeId::from_str_radix(token, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_record() {
        let line = "00:00:01.000 Node:1 :Incoming DIO (id, ver, rank) = (30,1,10) from:fe80::1:1:1:7";
        let record = LineClassifier::parse_base(line).unwrap();
        assert_eq!(record.absolute_time, 1.0);
        assert_eq!(record.timestamp_text, "00:00:01.000");
        assert_eq!(record.node_id, 1);
        assert!(record.message.starts_with("Incoming DIO"));
    }

    #[test]
    fn test_base_record_with_sim_counter_prefix() {
        let line = "273994:00:19:56.392 Node:02 :[INFO: RPL       ] --- RPL Neighbour Set for Instance ID: 46 ---";
        let record = LineClassifier::parse_base(line).unwrap();
        assert_eq!(record.timestamp_text, "00:19:56.392");
        assert!((record.absolute_time - 1196.392).abs() < 1e-9);
        assert_eq!(record.node_id, 2);

        assert!(LineClassifier::parse_base("abc:00:00:01.000 Node:2 :x").is_none());
        assert!(LineClassifier::parse_base(":00:00:01.000 Node:2 :x").is_none());
    }

    #[test]
    fn test_base_record_rejects_garbage() {
        assert!(LineClassifier::parse_base("").is_none());
        assert!(LineClassifier::parse_base("Simulation started").is_none());
        assert!(LineClassifier::parse_base("00:00:01.000 ID:1 hello").is_none());
        assert!(LineClassifier::parse_base("aa:00:01.000 Node:1 :x").is_none());
        assert!(LineClassifier::parse_base("00:00:01.000 Node:x :x").is_none());
    }

    #[test]
    fn test_reception() {
        let payload = LineClassifier::classify_message(
            "Incoming DIO (id, ver, rank) = (30,240,128) from:fe80::212:740a:a:a0a",
        );
        assert_eq!(
            payload,
            LinePayload::Reception {
                instance: "30".to_string(),
                sender: 0xa0a,
            }
        );
    }

    #[test]
    fn test_reception_with_bad_sender_is_discarded() {
        let payload = LineClassifier::classify_message(
            "Incoming DIO (id, ver, rank) = (30,1,10) from:fe80::",
        );
        assert!(matches!(payload, LinePayload::Discarded(_)));

        let payload =
            LineClassifier::classify_message("Incoming DIO (id, ver, rank) = (x,1,10) from:fe80::7");
        assert!(matches!(payload, LinePayload::Discarded(_)));
    }

    #[test]
    fn test_announcement() {
        let payload = LineClassifier::classify_message(
            "RPL: DAG: fd00 rank 256 Parent: 07, etx 128, Fresh U, Pref Y",
        );
        assert_eq!(
            payload,
            LinePayload::Announcement {
                dag: "fd00".to_string(),
                parent: Some(7),
                preferred: true,
            }
        );

        let payload =
            LineClassifier::classify_message("RPL: DAG: fd02 Parent: NONE, Pref N");
        assert_eq!(
            payload,
            LinePayload::Announcement {
                dag: "fd02".to_string(),
                parent: None,
                preferred: false,
            }
        );
    }

    #[test]
    fn test_announcement_with_bad_parent_is_discarded() {
        let payload = LineClassifier::classify_message("RPL: DAG: fd00 Parent: 0g, Pref Y");
        assert_eq!(
            payload,
            LinePayload::Discarded("Parent field is not a hex node id")
        );
        let payload = LineClassifier::classify_message("RPL: DAG: fd00 Parent: 07");
        assert_eq!(payload, LinePayload::Discarded("missing Pref marker"));
    }

    #[test]
    fn test_table_lines() {
        assert_eq!(
            LineClassifier::classify_message(
                "[INFO: RPL       ] --- RPL Neighbour Set for Instance ID: 46 ---"
            ),
            LinePayload::TableStart {
                instance: "46".to_string()
            }
        );
        assert_eq!(
            LineClassifier::classify_message(
                "[INFO: RPL       ] Parent: 08 | Rank 256 | Fresh U, Pref Y"
            ),
            LinePayload::TableEntry {
                parent: Some(8),
                preferred: true
            }
        );
        assert_eq!(
            LineClassifier::classify_message("[INFO: RPL       ] Parent:0a | Pref N"),
            LinePayload::TableEntry {
                parent: Some(10),
                preferred: false
            }
        );
        assert_eq!(
            LineClassifier::classify_message("[INFO: RPL       ] --- End of Table ---"),
            LinePayload::TableEnd
        );
    }

    #[test]
    fn test_preference_requires_separator() {
        assert_eq!(LineClassifier::parse_preference("Preferred: Y, Pref N"), Some(false));
        assert_eq!(LineClassifier::parse_preference("Preferred: Y"), None);
    }

    #[test]
    fn test_unrelated_message() {
        assert_eq!(
            LineClassifier::classify_message("[INFO: App       ] Sending request 4"),
            LinePayload::Other
        );
    }
}
