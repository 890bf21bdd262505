//! Parsers for the text replies of INFO and DEBUG OBJECT.

use std::collections::BTreeMap;

/// Parsed INFO reply, grouped by `# Section` headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ServerInfo {
    /// Look a field up in any section.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.sections
            .values()
            .find_map(|fields| fields.get(field))
            .map(String::as_str)
    }

    /// All fields of all sections in one map.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.sections
            .values()
            .flat_map(|fields| fields.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }
}

/// Database indexes named by `dbN` fields, ascending and deduplicated.
pub fn keyspace_databases<'a>(fields: impl IntoIterator<Item = &'a String>) -> Vec<u32> {
    let mut dbs: Vec<u32> = fields
        .into_iter()
        .filter_map(|name| name.strip_prefix("db"))
        .filter_map(|index| index.parse().ok())
        .collect();
    dbs.sort_unstable();
    dbs.dedup();
    dbs
}

/// Parse full INFO output into sections.
pub fn parse_info(info: &str) -> ServerInfo {
    let mut sections = BTreeMap::new();
    let mut current_section = String::from("default");

    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            current_section = line.trim_start_matches('#').trim().to_lowercase();
            continue;
        }
        if let Some((key, val)) = line.split_once(':') {
            sections
                .entry(current_section.clone())
                .or_insert_with(BTreeMap::new)
                .insert(key.to_string(), val.to_string());
        }
    }

    ServerInfo { sections }
}

/// Read `serializedlength` out of a DEBUG OBJECT reply such as
/// `Value at:0x7f.. refcount:1 encoding:embstr serializedlength:6 lru:..`.
pub fn parse_serialized_length(reply: &str) -> Option<u64> {
    reply
        .split_whitespace()
        .filter_map(|pair| pair.split_once(':'))
        .find(|(name, _)| *name == "serializedlength")
        .and_then(|(_, value)| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Server\r\nredis_version:7.2.0\r\nuptime_in_seconds:100\r\n\r\n# Clients\r\nconnected_clients:5\r\n\r\n# Keyspace\r\ndb0:keys=10,expires=2,avg_ttl=0\r\ndb12:keys=1,expires=0,avg_ttl=0\r\ndb2:keys=3,expires=0,avg_ttl=0\r\n";

    #[test]
    fn test_parse_info_sections() {
        let parsed = parse_info(INFO);
        assert!(parsed.sections.contains_key("server"));
        assert!(parsed.sections.contains_key("clients"));
        assert_eq!(parsed.sections["server"]["redis_version"], "7.2.0");
        assert_eq!(parsed.sections["clients"]["connected_clients"], "5");
    }

    #[test]
    fn test_get_across_sections() {
        let parsed = parse_info(INFO);
        assert_eq!(parsed.get("connected_clients"), Some("5"));
        assert_eq!(parsed.get("uptime_in_seconds"), Some("100"));
        assert_eq!(parsed.get("missing"), None);
    }

    #[test]
    fn test_databases_sorted_numerically() {
        let flat = parse_info(INFO).flatten();
        assert_eq!(keyspace_databases(flat.keys()), vec![0, 2, 12]);
    }

    #[test]
    fn test_flatten_keeps_keyspace_lines() {
        let flat = parse_info(INFO).flatten();
        assert_eq!(flat["db0"], "keys=10,expires=2,avg_ttl=0");
        assert_eq!(flat["redis_version"], "7.2.0");
    }

    #[test]
    fn test_parse_serialized_length() {
        let reply = "Value at:0x7f1c2a0 refcount:1 encoding:embstr serializedlength:6 lru:123 lru_seconds_idle:4";
        assert_eq!(parse_serialized_length(reply), Some(6));
        assert_eq!(parse_serialized_length("Value at:0x0 refcount:1"), None);
    }
}
