//! Catalog of render templates.
//!
//! Four templates are rendered per outage group and two aggregate views per
//! region. Each template names its HTML file under the served root, the
//! container element that is captured, and the DOM markers used as a
//! fallback completion signal.

use std::path::Path;
use std::str::FromStr;

use url::Url;

use gridcast_types::{Day, GridcastError, OutageGroup, Theme};

/// Element every template wraps its rendered content in.
pub const CAPTURE_SELECTOR: &str = "#capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    /// Weekly matrix for one group.
    Week,
    Today,
    Tomorrow,
    /// Interval list and current status for one group.
    Summary,
    OverviewToday,
    OverviewTomorrow,
}

impl TemplateKind {
    /// Templates rendered once per outage group.
    pub const PER_GROUP: [TemplateKind; 4] = [
        TemplateKind::Week,
        TemplateKind::Today,
        TemplateKind::Tomorrow,
        TemplateKind::Summary,
    ];

    /// Templates rendered once per region, covering all groups.
    pub const AGGREGATE: [TemplateKind; 2] =
        [TemplateKind::OverviewToday, TemplateKind::OverviewTomorrow];

    pub fn all() -> impl Iterator<Item = TemplateKind> {
        Self::PER_GROUP.into_iter().chain(Self::AGGREGATE)
    }

    pub fn name(self) -> &'static str {
        match self {
            TemplateKind::Week => "week",
            TemplateKind::Today => "today",
            TemplateKind::Tomorrow => "tomorrow",
            TemplateKind::Summary => "summary",
            TemplateKind::OverviewToday => "overview-today",
            TemplateKind::OverviewTomorrow => "overview-tomorrow",
        }
    }

    /// Template file relative to the served root.
    pub fn file(self) -> &'static str {
        match self {
            TemplateKind::Week => "templates/matrix.html",
            TemplateKind::Today | TemplateKind::Tomorrow => "templates/daily.html",
            TemplateKind::Summary => "templates/summary.html",
            TemplateKind::OverviewToday | TemplateKind::OverviewTomorrow => {
                "templates/overview.html"
            }
        }
    }

    /// Day selector baked into the template, if any.
    pub fn day(self) -> Option<Day> {
        match self {
            TemplateKind::Today | TemplateKind::OverviewToday => Some(Day::Today),
            TemplateKind::Tomorrow | TemplateKind::OverviewTomorrow => Some(Day::Tomorrow),
            TemplateKind::Week | TemplateKind::Summary => None,
        }
    }

    pub fn is_aggregate(self) -> bool {
        Self::AGGREGATE.contains(&self)
    }

    pub fn container_selector(self) -> &'static str {
        CAPTURE_SELECTOR
    }

    /// Selectors that indicate a populated template; any one is enough.
    pub fn ready_markers(self) -> &'static [&'static str] {
        match self {
            TemplateKind::Week => &["table.matrix tbody tr:last-child td:last-child:not(:empty)"],
            TemplateKind::Today | TemplateKind::Tomorrow => {
                &["table.daily tbody tr:last-child td:last-child:not(:empty)"]
            }
            TemplateKind::Summary => &[".intervals li", ".status.active"],
            TemplateKind::OverviewToday | TemplateKind::OverviewTomorrow => {
                &["table.overview tbody tr:last-child td:last-child:not(:empty)"]
            }
        }
    }

    /// Elements the markers live in. If none exist once the document has
    /// loaded, the markup does not belong to this template.
    pub fn marker_hosts(self) -> &'static [&'static str] {
        match self {
            TemplateKind::Week => &["table.matrix"],
            TemplateKind::Today | TemplateKind::Tomorrow => &["table.daily"],
            TemplateKind::Summary => &[".intervals", ".status"],
            TemplateKind::OverviewToday | TemplateKind::OverviewTomorrow => &["table.overview"],
        }
    }

    /// Output file name: `<group suffix>-<name>.png` per group, `<name>.png`
    /// for aggregates.
    pub fn output_filename(self, group: Option<&OutageGroup>) -> String {
        match (self.is_aggregate(), group) {
            (false, Some(group)) => format!("{}-{}.png", group.file_suffix(), self.name()),
            _ => format!("{}.png", self.name()),
        }
    }

    /// Template URL on the static server with theme and day query parameters.
    pub fn url(self, base_url: &str, theme: Theme, day: Option<Day>) -> Result<String, GridcastError> {
        let base = Url::parse(base_url)
            .map_err(|e| GridcastError::Config(format!("invalid server URL {base_url}: {e}")))?;
        let mut url = base
            .join(self.file())
            .map_err(|e| GridcastError::Config(format!("invalid template path: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("theme", theme.as_str());
            if let Some(day) = day {
                query.append_pair("day", day.as_str());
            }
        }
        Ok(url.to_string())
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::all()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| {
                let names: Vec<&str> = TemplateKind::all().map(TemplateKind::name).collect();
                format!("unknown template {s:?}, expected one of: {}", names.join(", "))
            })
    }
}

/// Fail with `NotFound` if any template file is missing under `root`.
pub fn verify_templates(root: &Path) -> Result<(), GridcastError> {
    let mut files: Vec<&str> = TemplateKind::all().map(TemplateKind::file).collect();
    files.dedup();
    for file in files {
        let path = root.join(file);
        if !path.is_file() {
            return Err(GridcastError::NotFound {
                what: format!("template {}", path.display()),
            });
        }
    }
    Ok(())
}
