use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// StatsReport collects the statistics a transport reports, keyed by
/// stats id. Values are kept in the transport's own JSON shape.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub reports: HashMap<String, serde_json::Value>,
}

impl StatsReport {
    pub fn get(&self, id: &str) -> Option<&serde_json::Value> {
        self.reports.get(id)
    }

    /// of_type returns every report whose `type` field equals stats_type.
    pub fn of_type<'a>(
        &'a self,
        stats_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a serde_json::Value)> + 'a {
        self.reports
            .iter()
            .filter(move |(_, v)| v.get("type").and_then(|t| t.as_str()) == Some(stats_type))
    }
}
