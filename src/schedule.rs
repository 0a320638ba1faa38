// src/schedule.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const ENV_SCHEDULE_PATH: &str = "POEM_SCHEDULE_PATH";

/// Poet id on the content source side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u32);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub display_name: String,
}

impl Category {
    pub fn new(id: u32, display_name: &str) -> Self {
        Self {
            id: CategoryId(id),
            display_name: display_name.to_string(),
        }
    }
}

/// Weekday → poet table. Built once at startup and only read afterwards.
/// Any day without an entry resolves to Saturday's poet.
#[derive(Debug, Clone)]
pub struct CategorySchedule {
    days: HashMap<Weekday, Category>,
    fallback: Category,
}

impl Default for CategorySchedule {
    fn default() -> Self {
        let table = [
            (Weekday::Sat, Category::new(2, "حافظ")),
            (Weekday::Sun, Category::new(5, "مولانا")),
            (Weekday::Mon, Category::new(7, "سعدی")),
            (Weekday::Tue, Category::new(3, "خیام")),
            (Weekday::Wed, Category::new(4, "فردوسی")),
            (Weekday::Thu, Category::new(71, "شهریار")),
            (Weekday::Fri, Category::new(10, "باباطاهر")),
        ];
        let fallback = table[0].1.clone();
        Self {
            days: table.into_iter().collect(),
            fallback,
        }
    }
}

impl CategorySchedule {
    pub fn resolve(&self, day: Weekday) -> &Category {
        self.days.get(&day).unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Load a schedule override from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading poet schedule from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_schedule(&content, ext.as_str())
    }

    fn from_entries(entries: Vec<DayEntry>) -> Result<Self> {
        let mut days = HashMap::new();
        for e in entries {
            let day: Weekday = e
                .weekday
                .trim()
                .parse()
                .map_err(|_| anyhow!("unknown weekday `{}`", e.weekday))?;
            let name = e.name.trim();
            if name.is_empty() {
                bail!("empty poet name for {day}");
            }
            if days.insert(day, Category::new(e.category_id, name)).is_some() {
                bail!("weekday {day} listed twice");
            }
        }
        let fallback = days
            .get(&Weekday::Sat)
            .cloned()
            .ok_or_else(|| anyhow!("schedule must define Saturday"))?;
        Ok(Self { days, fallback })
    }
}

#[derive(Debug, Deserialize)]
struct DayEntry {
    weekday: String,
    category_id: u32,
    name: String,
}

fn parse_schedule(s: &str, hint_ext: &str) -> Result<CategorySchedule> {
    let entries = match hint_ext {
        "toml" => parse_toml(s).context("parsing TOML poet schedule")?,
        "json" => parse_json(s).context("parsing JSON poet schedule")?,
        _ => parse_json(s)
            .or_else(|_| parse_toml(s))
            .context("poet schedule is neither JSON nor TOML")?,
    };
    CategorySchedule::from_entries(entries)
}

fn parse_toml(s: &str) -> Result<Vec<DayEntry>> {
    #[derive(Deserialize)]
    struct TomlSchedule {
        day: Vec<DayEntry>,
    }
    let v: TomlSchedule = toml::from_str(s)?;
    Ok(v.day)
}

fn parse_json(s: &str) -> Result<Vec<DayEntry>> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_covers_the_whole_week() {
        let s = CategorySchedule::default();
        assert_eq!(s.len(), 7);
        assert_eq!(s.resolve(Weekday::Sat).id, CategoryId(2));
        assert_eq!(s.resolve(Weekday::Thu).id, CategoryId(71));
        assert_eq!(s.resolve(Weekday::Fri).display_name, "باباطاهر");
    }

    #[test]
    fn toml_override_falls_back_to_saturday() {
        let toml = r#"
[[day]]
weekday = "Saturday"
category_id = 2
name = "حافظ"

[[day]]
weekday = "mon"
category_id = 7
name = " سعدی "
"#;
        let s = parse_schedule(toml, "toml").unwrap();
        assert_eq!(s.resolve(Weekday::Mon).display_name, "سعدی");
        assert_eq!(s.resolve(Weekday::Wed).id, CategoryId(2));
    }

    #[test]
    fn broken_toml_reports_the_parser_error() {
        let toml = "[[day]]\nweekday = \"Saturday\"\ncategory_id = \"two\"\nname = \"حافظ\"\n";
        let err = parse_schedule(toml, "toml").unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.starts_with("parsing TOML poet schedule: "));
        assert!(msg.contains("invalid type"), "{msg}");
        assert!(!msg.contains("unsupported"));
    }

    #[test]
    fn unknown_extension_is_sniffed() {
        let json = r#"[{"weekday": "Saturday", "category_id": 3, "name": "خیام"}]"#;
        assert_eq!(parse_schedule(json, "conf").unwrap().len(), 1);
        let toml = "[[day]]\nweekday = \"Sat\"\ncategory_id = 2\nname = \"حافظ\"\n";
        assert_eq!(parse_schedule(toml, "").unwrap().len(), 1);
    }

    #[test]
    fn json_without_saturday_is_rejected() {
        let json = r#"[{"weekday": "Sunday", "category_id": 5, "name": "مولانا"}]"#;
        let err = parse_schedule(json, "json").unwrap_err();
        assert!(err.to_string().contains("Saturday"));
    }

    #[test]
    fn duplicate_days_are_rejected() {
        let json = r#"[
            {"weekday": "Saturday", "category_id": 2, "name": "a"},
            {"weekday": "sat", "category_id": 3, "name": "b"}
        ]"#;
        assert!(parse_schedule(json, "").is_err());
    }
}
