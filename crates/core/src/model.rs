//! Records decoded from client responses and the donor API.

use serde::{Deserialize, Deserializer, Serialize};

/// One work-queue entry reported by `queue-info`.
///
/// Identity is the pair (`slot`, `id`); the queue id alone is only unique
/// within a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Queue entry id (e.g. `"01"`).
    pub id: String,
    /// Slot the entry is assigned to.
    pub slot: String,
    /// State name, e.g. `RUNNING`, `READY`, `SEND`.
    #[serde(default, deserialize_with = "nullable")]
    pub state: String,
    /// Error text; `NO_ERROR` when healthy.
    #[serde(default, deserialize_with = "nullable")]
    pub error: String,

    /// Project number of the work unit.
    #[serde(default, deserialize_with = "nullable")]
    pub project: i64,
    /// Run within the project.
    #[serde(default, deserialize_with = "nullable")]
    pub run: i64,
    /// Clone within the run.
    #[serde(default, deserialize_with = "nullable")]
    pub clone: i64,
    /// Generation within the clone.
    #[serde(default, deserialize_with = "nullable")]
    pub gen: i64,
    /// Folding core id, e.g. `0xa8`.
    #[serde(default, deserialize_with = "nullable")]
    pub core: String,
    /// Work unit hash.
    #[serde(default, deserialize_with = "nullable")]
    pub unit: String,

    /// Completion as a percentage string, e.g. `"42.17%"`.
    #[serde(default, rename = "percentdone", deserialize_with = "nullable")]
    pub percent_done: String,
    /// Estimated time remaining, human text.
    #[serde(default, deserialize_with = "nullable")]
    pub eta: String,
    /// Points per day as decimal text.
    #[serde(default, deserialize_with = "nullable")]
    pub ppd: String,
    /// Estimated credit as decimal text.
    #[serde(default, rename = "creditestimate", deserialize_with = "nullable")]
    pub credit_estimate: String,

    /// Frames in the work unit.
    #[serde(default, rename = "totalframes", deserialize_with = "nullable")]
    pub total_frames: i64,
    /// Frames completed so far.
    #[serde(default, rename = "framesdone", deserialize_with = "nullable")]
    pub frames_done: i64,
}

/// One compute unit reported by `slot-info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot id (e.g. `"00"`).
    pub id: String,
    /// Status, e.g. `RUNNING`, `PAUSED`.
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    /// Hardware description, e.g. `cpu:14`.
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    /// Per-slot options; only `paused` is read.
    #[serde(default, deserialize_with = "nullable")]
    pub options: SlotOptions,
    /// Pause reason, empty when running.
    #[serde(default, deserialize_with = "nullable")]
    pub reason: String,
    /// `None` on the wire is treated as not idle.
    #[serde(default, deserialize_with = "nullable")]
    pub idle: bool,
}

/// Options nested under a slot record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotOptions {
    /// Whether the slot is paused.
    #[serde(default, deserialize_with = "nullable")]
    pub paused: bool,
}

/// Client-wide options reported by `options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Configured donor name.
    #[serde(default, deserialize_with = "nullable")]
    pub user: String,
    /// Configured team number, as text.
    #[serde(default, deserialize_with = "nullable")]
    pub team: String,
    /// Power setting (`light`, `medium`, `full`).
    #[serde(default, deserialize_with = "nullable")]
    pub power: String,
}

/// Donor record from the stats API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    /// Numeric donor id.
    #[serde(default, deserialize_with = "nullable")]
    pub id: i64,
    /// Donor name; empty when no record was ever fetched.
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    /// Global rank by credit.
    #[serde(default, deserialize_with = "nullable")]
    pub rank: i64,
    /// Total credit earned.
    #[serde(default, deserialize_with = "nullable")]
    pub credit: i64,
    /// Completed work units.
    #[serde(default, deserialize_with = "nullable")]
    pub wus: i64,
    /// Credit broken down per team.
    #[serde(default, deserialize_with = "nullable")]
    pub teams: Vec<DonorTeam>,
}

/// Per-team credit entry of a donor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonorTeam {
    /// Team number; `0` is the default team.
    pub team: i64,
    /// Team name.
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    /// Credit earned by the donor for this team.
    #[serde(default, deserialize_with = "nullable")]
    pub credit: i64,
    /// Work units completed for this team.
    #[serde(default, deserialize_with = "nullable")]
    pub wus: i64,
}

/// Everything decoded during one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Work-queue entries, in client order.
    pub tasks: Vec<Task>,
    /// Slots, in client order.
    pub slots: Vec<Slot>,
    /// Client-wide options.
    pub options: ClientOptions,
    /// Present only when enrichment is enabled.
    pub donor: Option<Donor>,
}

impl Snapshot {
    /// Tasks whose slot id matches no slot of this snapshot.
    pub fn orphaned_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks
            .iter()
            .filter(move |t| !self.slots.iter().any(|s| s.id == t.slot))
    }
}

/// Deserializes `null` as the type's default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
