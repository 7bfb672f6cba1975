// Copyright 2024 Icinga GmbH
// This file is part of ido-writer.

// ido-writer is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// ido-writer is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with ido-writer.  If not, see <http://www.gnu.org/licenses/>.

//! The Stats Surface: a point-in-time snapshot external readers (a CLI
//! status command, a perfdata exporter) can pull without touching the
//! worker thread.

use serde::Serialize;

use crate::query::Category;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub version: Option<String>,
    pub instance_name: String,
    pub query_queue_items: usize,
    #[serde(skip)]
    pub categories: Category,
}

impl Stats {
    /// The perfdata metric key, in the form
    /// `idomysqlconnection_<name>_query_queue_items`.
    pub fn perfdata_key(&self) -> String {
        format!("idomysqlconnection_{}_query_queue_items", self.instance_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfdata_key_includes_instance_name() {
        let stats = Stats {
            version: Some("1.11.0".to_owned()),
            instance_name: "default".to_owned(),
            query_queue_items: 3,
            categories: Category::ALL,
        };
        assert_eq!(stats.perfdata_key(), "idomysqlconnection_default_query_queue_items");
    }

    #[test]
    fn serializes_without_the_category_mask() {
        let stats = Stats { version: None, instance_name: "default".to_owned(), query_queue_items: 0, categories: Category::ALL };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("categories"));
        assert!(json.contains("query_queue_items"));
    }
}
