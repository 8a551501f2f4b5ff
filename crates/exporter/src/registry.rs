//! Gauge families and snapshot reconciliation.
//!
//! Gauge vectors keep every label combination they were ever given. To expose
//! only what the latest poll reported, each snapshot is flattened into
//! `(family, labels, value)` series and diffed against the previous snapshot:
//! keys that are gone get removed, then current keys are set.

use std::collections::{BTreeSet, HashMap};

use fah_core::{parse_decimal, parse_percent, FieldParseError, Snapshot};
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

const NAMESPACE: &str = "fah";

/// A labeled gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Options,
    Description,
    Status,
    Idle,
    Paused,
    FramesDone,
    TotalFrames,
    PercentDone,
    Ppd,
    CreditEstimate,
    QueueInfo,
    DonorCredit,
    DonorId,
    DonorRank,
    DonorWus,
    DonorTeamCredit,
}

impl Family {
    pub const ALL: [Family; 16] = [
        Family::Options,
        Family::Description,
        Family::Status,
        Family::Idle,
        Family::Paused,
        Family::FramesDone,
        Family::TotalFrames,
        Family::PercentDone,
        Family::Ppd,
        Family::CreditEstimate,
        Family::QueueInfo,
        Family::DonorCredit,
        Family::DonorId,
        Family::DonorRank,
        Family::DonorWus,
        Family::DonorTeamCredit,
    ];

    /// Metric name without the namespace.
    pub fn name(self) -> &'static str {
        match self {
            Family::Options => "options",
            Family::Description => "description",
            Family::Status => "status",
            Family::Idle => "idle",
            Family::Paused => "paused",
            Family::FramesDone => "frames_done",
            Family::TotalFrames => "total_frames",
            Family::PercentDone => "percent_done",
            Family::Ppd => "ppd",
            Family::CreditEstimate => "credit_estimate",
            Family::QueueInfo => "queue_info",
            Family::DonorCredit => "donor_credit",
            Family::DonorId => "donor_id",
            Family::DonorRank => "donor_rank",
            Family::DonorWus => "donor_wus",
            Family::DonorTeamCredit => "donor_team_credit",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Family::Options => "Client options",
            Family::Description => "Folding slot description",
            Family::Status => "Folding slot status",
            Family::Idle => "Whether slot is idle",
            Family::Paused => "Whether slot is paused",
            Family::FramesDone => "Task frames done",
            Family::TotalFrames => "Task total frames",
            Family::PercentDone => "Task percent done",
            Family::Ppd => "Task points per day",
            Family::CreditEstimate => "Task estimated credit",
            Family::QueueInfo => "Task state, ETA and eventual error",
            Family::DonorCredit => "Donor total credit",
            Family::DonorId => "Donor user ID",
            Family::DonorRank => "Donor rank",
            Family::DonorWus => "Donor completed work units",
            Family::DonorTeamCredit => "Donor credit per team",
        }
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Family::Options => &["user", "team", "power"],
            Family::Description => &["slot", "description"],
            Family::Status => &["slot", "status"],
            Family::Idle => &["slot"],
            Family::Paused => &["slot", "reason"],
            Family::FramesDone
            | Family::TotalFrames
            | Family::PercentDone
            | Family::Ppd
            | Family::CreditEstimate => &["slot", "queue"],
            Family::QueueInfo => &["slot", "queue", "state", "eta", "error"],
            Family::DonorCredit | Family::DonorId | Family::DonorRank | Family::DonorWus => &["user"],
            Family::DonorTeamCredit => &["user", "name", "team"],
        }
    }

    /// Donor families exist only with enrichment enabled.
    pub fn is_donor(self) -> bool {
        matches!(
            self,
            Family::DonorCredit
                | Family::DonorId
                | Family::DonorRank
                | Family::DonorWus
                | Family::DonorTeamCredit
        )
    }
}

/// Identity of one exposed series.
pub type SeriesKey = (Family, Vec<String>);

/// One value derived from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub family: Family,
    pub labels: Vec<String>,
    pub value: Result<f64, FieldParseError>,
}

impl Series {
    pub fn key(&self) -> SeriesKey {
        (self.family, self.labels.clone())
    }
}

#[derive(Default)]
struct SeriesSet(Vec<Series>);

impl SeriesSet {
    fn add(&mut self, family: Family, labels: &[&str], value: Result<f64, FieldParseError>) {
        debug_assert_eq!(labels.len(), family.labels().len(), "{family:?}");
        self.0.push(Series {
            family,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        });
    }
}

fn flag(b: bool) -> Result<f64, FieldParseError> {
    Ok(if b { 1.0 } else { 0.0 })
}

/// Flattens a snapshot into every series it should expose.
pub fn series(snapshot: &Snapshot) -> Vec<Series> {
    let mut out = SeriesSet::default();

    let o = &snapshot.options;
    out.add(Family::Options, &[&o.user, &o.team, &o.power], Ok(1.0));

    for s in &snapshot.slots {
        out.add(Family::Description, &[&s.id, &s.description], Ok(1.0));
        out.add(Family::Status, &[&s.id, &s.status], Ok(1.0));
        out.add(Family::Idle, &[&s.id], flag(s.idle));
        out.add(Family::Paused, &[&s.id, &s.reason], flag(s.options.paused));
    }

    for t in &snapshot.tasks {
        let key = [t.slot.as_str(), t.id.as_str()];
        out.add(Family::FramesDone, &key, Ok(t.frames_done as f64));
        out.add(Family::TotalFrames, &key, Ok(t.total_frames as f64));
        out.add(Family::PercentDone, &key, parse_percent("percentdone", &t.percent_done));
        out.add(Family::Ppd, &key, parse_decimal("ppd", &t.ppd));
        out.add(Family::CreditEstimate, &key, parse_decimal("creditestimate", &t.credit_estimate));
        out.add(
            Family::QueueInfo,
            &[&t.slot, &t.id, &t.state, &t.eta, &t.error],
            Ok(1.0),
        );
    }

    // A donor without a name was never fetched successfully.
    if let Some(d) = snapshot.donor.as_ref().filter(|d| !d.name.is_empty()) {
        out.add(Family::DonorCredit, &[&d.name], Ok(d.credit as f64));
        out.add(Family::DonorId, &[&d.name], Ok(d.id as f64));
        out.add(Family::DonorRank, &[&d.name], Ok(d.rank as f64));
        out.add(Family::DonorWus, &[&d.name], Ok(d.wus as f64));
        for team in &d.teams {
            let id = team.team.to_string();
            out.add(Family::DonorTeamCredit, &[&d.name, &team.name, &id], Ok(team.credit as f64));
        }
    }

    out.0
}

/// Counters for one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub set: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// The exposed gauges.
pub struct GaugeRegistry {
    registry: Registry,
    up: Gauge,
    slot_count: Gauge,
    families: HashMap<Family, GaugeVec>,
}

impl GaugeRegistry {
    /// Registers all families; donor families only when `enrichment` is set.
    pub fn new(enrichment: bool) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let up = Gauge::with_opts(
            Opts::new("up", "FAH Metric Collection Operational").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(up.clone()))?;
        let slot_count = Gauge::with_opts(
            Opts::new("slot_count", "Count of folding slots").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(slot_count.clone()))?;

        let mut families = HashMap::new();
        for family in Family::ALL {
            if family.is_donor() && !enrichment {
                continue;
            }
            let vec = GaugeVec::new(
                Opts::new(family.name(), family.help()).namespace(NAMESPACE),
                family.labels(),
            )?;
            registry.register(Box::new(vec.clone()))?;
            families.insert(family, vec);
        }

        Ok(Self {
            registry,
            up,
            slot_count,
            families,
        })
    }

    /// Flags the last poll as failed. Every other value is left as it was.
    pub fn mark_down(&self) {
        self.up.set(0.0);
    }

    /// Removes series of `previous` that `current` no longer has, then sets
    /// every series of `current`.
    pub fn publish(&self, previous: &Snapshot, current: &Snapshot) -> PublishStats {
        let fresh = series(current);
        let live: BTreeSet<SeriesKey> = fresh
            .iter()
            .filter(|s| s.value.is_ok())
            .map(Series::key)
            .collect();
        let stale: BTreeSet<SeriesKey> = series(previous)
            .iter()
            .map(Series::key)
            .filter(|key| !live.contains(key))
            .collect();

        let mut stats = PublishStats::default();
        for (family, labels) in &stale {
            let Some(vec) = self.families.get(family) else {
                continue;
            };
            // Keys that were never set (failed parse) are not found; that is fine.
            if vec.remove_label_values(&label_refs(labels)).is_ok() {
                stats.removed += 1;
            }
        }

        for s in fresh {
            let Some(vec) = self.families.get(&s.family) else {
                continue;
            };
            match s.value {
                Ok(value) => {
                    vec.with_label_values(&label_refs(&s.labels)).set(value);
                    stats.set += 1;
                }
                Err(e) => {
                    debug!(family = s.family.name(), labels = ?s.labels, error = %e, "value skipped");
                    stats.skipped += 1;
                }
            }
        }

        self.slot_count.set(current.slots.len() as f64);
        self.up.set(1.0);
        stats
    }

    /// Renders every family in the text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn label_refs(labels: &[String]) -> Vec<&str> {
    labels.iter().map(String::as_str).collect()
}
