//! Live arrival data and the per-stop message assembled from it.

use std::fmt;

use serde::Serialize;

use super::stop::Stop;

/// Marker rendered for a line that is known but has no current arrivals.
pub const NO_INFORMATION: &str = "No information.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalAnnouncement {
    pub line: String,
    pub terminus: String,
    pub announcement: String,
}

impl ArrivalAnnouncement {
    pub fn new(
        line: impl Into<String>,
        terminus: impl Into<String>,
        announcement: impl Into<String>,
    ) -> Self {
        Self {
            line: line.into(),
            terminus: terminus.into(),
            announcement: announcement.into(),
        }
    }

    pub fn group_key(&self) -> String {
        group_key(&self.line, &self.terminus)
    }
}

fn group_key(line: &str, terminus: &str) -> String {
    format!("{line} {terminus}")
}

/// Announcements for one "line terminus" pair, in arrival order. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineGroup {
    pub key: String,
    pub announcements: Vec<ArrivalAnnouncement>,
}

/// Everything the front-end shows for one nearby stop. Built per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseAggregate {
    pub reference_id: String,
    pub stop_id: String,
    pub stop_name: String,
    pub stop_desc: Option<String>,
    pub distance_meters: f64,
    groups: Vec<LineGroup>,
}

impl ResponseAggregate {
    pub fn new(stop: &Stop, distance_meters: f64) -> Self {
        Self {
            reference_id: stop.reference_id.clone(),
            stop_id: stop.stop_id.clone(),
            stop_name: stop.stop_name.clone(),
            stop_desc: stop.stop_desc.clone(),
            distance_meters,
            groups: Vec::new(),
        }
    }

    /// Appends to the announcement's group, creating it on first sight.
    pub fn add(&mut self, announcement: ArrivalAnnouncement) {
        let key = announcement.group_key();
        self.group_mut(key).announcements.push(announcement);
    }

    /// Registers a line with no announcements (yet).
    ///
    /// Live responses only carry lines that have arrivals, so nothing in this
    /// crate declares lines on its own. A front-end that knows which lines serve
    /// a stop calls this before rendering so those lines show [`NO_INFORMATION`]
    /// instead of being left out.
    pub fn declare_line(&mut self, line: &str, terminus: &str) {
        self.group_mut(group_key(line, terminus));
    }

    pub fn groups(&self) -> &[LineGroup] {
        &self.groups
    }

    pub fn group(&self, line: &str, terminus: &str) -> Option<&LineGroup> {
        let key = group_key(line, terminus);
        self.groups.iter().find(|g| g.key == key)
    }

    fn group_mut(&mut self, key: String) -> &mut LineGroup {
        let index = match self.groups.iter().position(|g| g.key == key) {
            Some(index) => index,
            None => {
                self.groups.push(LineGroup {
                    key,
                    announcements: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// The outbound message text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResponseAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stop {}", self.stop_id)?;
        writeln!(f, "{}", self.stop_name)?;
        if let Some(desc) = self.stop_desc.as_deref().filter(|d| !d.is_empty()) {
            writeln!(f, "{desc}")?;
        }
        writeln!(f)?;

        for group in &self.groups {
            writeln!(f, "Line {}", group.key)?;
            if group.announcements.is_empty() {
                writeln!(f, "  {NO_INFORMATION}")?;
            }
            for item in &group.announcements {
                writeln!(f, "  {}", item.announcement)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, GeoPoint, LiveDataDescriptor};

    fn stop() -> Stop {
        Stop {
            reference_id: "tper".to_string(),
            stop_id: "S1".to_string(),
            stop_code: None,
            stop_name: "Piazza Maggiore".to_string(),
            stop_desc: Some("Via Rizzoli".to_string()),
            location: GeoPoint::new(Coordinate::new(44.49, 11.34)),
            zone: None,
            stop_url: None,
            location_type: None,
            parent_station: None,
            live_data: serde_json::from_str::<LiveDataDescriptor>(
                r#"{"endpoint":"https://example.org"}"#,
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_groups_preserve_arrival_order_and_duplicates() {
        let mut aggregate = ResponseAggregate::new(&stop(), 12.0);
        aggregate.add(ArrivalAnnouncement::new("11", "Centro", "in 2 min"));
        aggregate.add(ArrivalAnnouncement::new("20", "Casalecchio", "in 5 min"));
        aggregate.add(ArrivalAnnouncement::new("11", "Centro", "in 2 min"));

        let groups = aggregate.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "11 Centro");
        assert_eq!(groups[0].announcements.len(), 2);
        assert_eq!(groups[1].key, "20 Casalecchio");
    }

    #[test]
    fn test_empty_group_renders_no_information_marker() {
        let mut aggregate = ResponseAggregate::new(&stop(), 0.0);
        aggregate.declare_line("11", "Centro");

        let text = aggregate.render();
        assert!(text.contains("Line 11 Centro"));
        assert!(text.contains(NO_INFORMATION));
    }

    #[test]
    fn test_single_announcement_renders_text_without_marker() {
        let mut aggregate = ResponseAggregate::new(&stop(), 0.0);
        aggregate.add(ArrivalAnnouncement::new("11", "Centro", "in arrivo alle 10:42"));

        let text = aggregate.render();
        assert!(text.contains("in arrivo alle 10:42"));
        assert!(!text.contains(NO_INFORMATION));
    }

    #[test]
    fn test_absent_line_renders_nothing() {
        let aggregate = ResponseAggregate::new(&stop(), 0.0);
        let text = aggregate.render();
        assert!(text.starts_with("Stop S1\nPiazza Maggiore\nVia Rizzoli\n"));
        assert!(!text.contains("Line"));
        assert!(aggregate.group("11", "Centro").is_none());
    }

    #[test]
    fn test_declared_line_takes_later_announcements() {
        let mut aggregate = ResponseAggregate::new(&stop(), 0.0);
        aggregate.declare_line("11", "Centro");
        aggregate.declare_line("20", "Casalecchio");
        aggregate.add(ArrivalAnnouncement::new("11", "Centro", "in 2 min"));

        assert_eq!(aggregate.groups().len(), 2);
        assert_eq!(aggregate.groups()[0].announcements.len(), 1);
        let text = aggregate.render();
        assert!(text.contains("Line 11 Centro\n  in 2 min\n"));
        assert!(text.contains("Line 20 Casalecchio\n  No information.\n"));
    }
}
