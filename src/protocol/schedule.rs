//! Schedule page decoding and assembly.
//!
//! `RetrieveScheduleRequest` returns one page per sub-command. The leading
//! nibble of the sub-command byte selects the page kind:
//!
//! | nibble | page                                          |
//! |--------|-----------------------------------------------|
//! | `0`    | controller info (station delay, rain delay, sensor) |
//! | `1`    | program info for program `n`                  |
//! | `6`    | start times for program `n`                   |
//! | `8`    | zone run times for zones `2n` and `2n + 1`    |
//!
//! [`SchedulePlan`] lists the pages to request for a model, and
//! [`ScheduleAssembler`] merges the replies by page code in any order.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use serde::Serialize;

use crate::core::{
    Error, MAX_SCHEDULE_ZONES, PROGRAMS_PER_DURATION_ENTRY, Result, START_TIME_DISABLED,
    ZONES_PER_DURATION_PAGE,
};

use super::{ProtocolFrame, StationSet};

/// How a program picks its watering days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgramFrequency {
    /// Selected days of the week.
    Custom,
    /// Every `period` days.
    Cyclic,
    /// Odd days of the month.
    Odd,
    /// Even days of the month.
    Even,
    /// A code this library does not know.
    Unknown(u8),
}

impl From<u8> for ProgramFrequency {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Custom,
            1 => Self::Cyclic,
            2 => Self::Odd,
            3 => Self::Even,
            other => Self::Unknown(other),
        }
    }
}

/// Controller-wide schedule settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    /// Delay between stations.
    pub station_delay: u16,
    /// Rain delay in days.
    pub rain_delay: u8,
    /// Rain sensor setting.
    pub rain_sensor: u8,
}

/// Run time of one zone within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneDuration {
    /// 1-based zone (station) number.
    pub zone: u8,
    /// Run time in minutes.
    pub minutes: u16,
}

impl ZoneDuration {
    /// Run time as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }
}

/// One irrigation program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    /// 0-based program index.
    pub program: u8,
    /// Display name, `PGM A` for program 0.
    pub name: String,
    /// Day selection mode.
    pub frequency: ProgramFrequency,
    /// Watering days; only set for [`ProgramFrequency::Custom`].
    pub days_of_week: Vec<Weekday>,
    /// Interval in days; only set for [`ProgramFrequency::Cyclic`].
    pub period: Option<u8>,
    /// Days until the next cyclic run.
    pub synchro: u8,
    /// Enabled start times, in page order.
    pub starts: Vec<NaiveTime>,
    /// Zone run times for available stations with a non-zero run time.
    pub durations: Vec<ZoneDuration>,
}

impl Program {
    /// Total run time of one program cycle.
    pub fn total_duration(&self) -> Duration {
        self.durations.iter().map(ZoneDuration::duration).sum()
    }
}

/// A fully assembled controller schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Controller-wide settings.
    pub controller: Option<ControllerInfo>,
    /// Programs in index order.
    pub programs: Vec<Program>,
}

/// One decoded schedule page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePage {
    /// Controller info page.
    Controller(ControllerInfo),
    /// Program info page.
    ProgramInfo {
        /// Program index.
        program: u8,
        /// Day-of-week bits, Sunday = bit 0.
        days_of_week_mask: u8,
        /// Cyclic interval.
        period: u8,
        /// Days until the next cyclic run.
        synchro: u8,
        /// Permanent days off mask.
        permanent_days_off: u8,
        /// Unused byte.
        reserved: u8,
        /// Frequency code.
        frequency: ProgramFrequency,
    },
    /// Start times page; raw minutes after midnight, `0xFFFF` = disabled.
    StartTimes {
        /// Program index.
        program: u8,
        /// Start slots.
        starts: Vec<u16>,
    },
    /// Run times for two consecutive zones, per program.
    RunTimes {
        /// Zone page index.
        zone_page: u8,
        /// `(0-based zone, minutes per program)` entries.
        zones: Vec<(u8, Vec<u16>)>,
    },
    /// A page kind this library does not decode.
    Other(ProtocolFrame),
}

impl SchedulePage {
    /// Parse an `A0` frame into its page code and contents.
    pub fn parse(frame: &ProtocolFrame) -> Result<(u16, SchedulePage)> {
        if frame.len_nibbles() < 6 {
            return Err(Error::MalformedFrame(format!("schedule page too short: {}", frame)));
        }
        let code = frame.read_uint(2, 4)? as u16;
        let subcommand = (code & 0xFF) as u8;
        let index = subcommand & 0x0F;
        let rest = frame.nibbles(6, frame.len_nibbles() - 6)?;

        let page = match subcommand >> 4 {
            0x0 => SchedulePage::Controller(ControllerInfo {
                station_delay: hex_u16(frame, 6, 4)?,
                rain_delay: hex_u16(frame, 10, 2)? as u8,
                rain_sensor: hex_u16(frame, 12, 2)? as u8,
            }),
            0x1 => {
                let b = |i: usize| hex_u16(frame, 6 + 2 * i, 2).map(|v| v as u8);
                SchedulePage::ProgramInfo {
                    program: index,
                    days_of_week_mask: b(0)?,
                    period: b(1)?,
                    synchro: b(2)?,
                    permanent_days_off: b(3)?,
                    reserved: b(4)?,
                    frequency: ProgramFrequency::from(b(5)?),
                }
            }
            0x6 => SchedulePage::StartTimes {
                program: index,
                starts: words(rest)?,
            },
            0x8 => {
                let minutes = words(rest)?;
                let mut zones = Vec::with_capacity(ZONES_PER_DURATION_PAGE);
                for (slot, chunk) in minutes
                    .chunks_exact(PROGRAMS_PER_DURATION_ENTRY)
                    .take(ZONES_PER_DURATION_PAGE)
                    .enumerate()
                {
                    let zone = index as usize * ZONES_PER_DURATION_PAGE + slot;
                    zones.push((zone as u8, chunk.to_vec()));
                }
                if zones.len() < ZONES_PER_DURATION_PAGE {
                    return Err(Error::MalformedFrame(format!(
                        "run time page too short: {}",
                        frame
                    )));
                }
                SchedulePage::RunTimes {
                    zone_page: index,
                    zones,
                }
            }
            _ => SchedulePage::Other(frame.clone()),
        };
        Ok((code, page))
    }
}

fn hex_u16(frame: &ProtocolFrame, position: usize, length: usize) -> Result<u16> {
    frame.read_uint(position, length).map(|v| v as u16)
}

fn words(digits: &str) -> Result<Vec<u16>> {
    digits
        .as_bytes()
        .chunks_exact(4)
        .map(|chunk| {
            std::str::from_utf8(chunk)
                .ok()
                .and_then(|s| u16::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::MalformedFrame(format!("bad schedule word in {}", digits)))
        })
        .collect()
}

/// Ordered list of schedule page codes to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan(Vec<u16>);

impl SchedulePlan {
    /// Plan for a model with `max_programs` programs whose station mask
    /// can describe `station_capacity` stations.
    pub fn new(max_programs: u8, station_capacity: usize) -> Self {
        let mut pages = vec![0x0000];
        pages.extend((0..u16::from(max_programs)).map(|p| 0x10 | p));
        pages.extend((0..u16::from(max_programs)).map(|p| 0x60 | p));
        let zones = station_capacity.min(MAX_SCHEDULE_ZONES);
        let zone_pages = zones.div_ceil(ZONES_PER_DURATION_PAGE) as u16;
        pages.extend((0..zone_pages).map(|z| 0x80 | z));
        Self(pages)
    }

    /// Page codes in request order.
    pub fn pages(&self) -> &[u16] {
        &self.0
    }

    /// The page whose arrival marks the end of the sequence.
    pub fn terminal(&self) -> u16 {
        self.0.last().copied().unwrap_or_default()
    }
}

/// Merges schedule pages into a [`Schedule`].
///
/// Pages are keyed by page code, so arrival order does not matter and a
/// repeated page replaces the earlier copy.
#[derive(Debug, Clone)]
pub struct ScheduleAssembler {
    plan: SchedulePlan,
    stations: StationSet,
    pages: BTreeMap<u16, SchedulePage>,
}

impl ScheduleAssembler {
    /// Start assembling against `plan`, keeping durations only for zones in
    /// `stations`.
    pub fn new(plan: SchedulePlan, stations: StationSet) -> Self {
        Self {
            plan,
            stations,
            pages: BTreeMap::new(),
        }
    }

    /// Accept one `A0` frame. Returns true once the schedule is complete.
    pub fn accept(&mut self, frame: &ProtocolFrame) -> Result<bool> {
        let (code, page) = SchedulePage::parse(frame)?;
        if !self.plan.pages().contains(&code) {
            return Err(Error::MalformedFrame(format!(
                "schedule page {:04X} was not requested",
                code
            )));
        }
        self.pages.insert(code, page);
        Ok(self.is_complete())
    }

    /// True when the terminal page and every other planned page were seen.
    pub fn is_complete(&self) -> bool {
        self.pages.contains_key(&self.plan.terminal()) && self.missing().is_empty()
    }

    /// Planned pages not yet received.
    pub fn missing(&self) -> Vec<u16> {
        self.plan
            .pages()
            .iter()
            .copied()
            .filter(|code| !self.pages.contains_key(code))
            .collect()
    }

    /// Merge the pages into a schedule.
    pub fn finish(self) -> Result<Schedule> {
        if !self.is_complete() {
            return Err(Error::IncompleteSchedule {
                missing: self.missing(),
            });
        }

        let mut schedule = Schedule::default();
        let mut starts: BTreeMap<u8, Vec<NaiveTime>> = BTreeMap::new();
        let mut durations: BTreeMap<u8, Vec<ZoneDuration>> = BTreeMap::new();

        for page in self.pages.values() {
            match page {
                SchedulePage::Controller(info) => schedule.controller = Some(*info),
                SchedulePage::StartTimes { program, starts: raw } => {
                    starts.insert(*program, start_times(raw));
                }
                SchedulePage::RunTimes { zones, .. } => {
                    for (zone, per_program) in zones {
                        if !self.stations.contains(zone + 1) {
                            continue;
                        }
                        for (program, minutes) in per_program.iter().enumerate() {
                            if *minutes == 0 {
                                continue;
                            }
                            durations.entry(program as u8).or_default().push(ZoneDuration {
                                zone: zone + 1,
                                minutes: *minutes,
                            });
                        }
                    }
                }
                SchedulePage::ProgramInfo { .. } | SchedulePage::Other(_) => {}
            }
        }

        for page in self.pages.values() {
            if let SchedulePage::ProgramInfo {
                program,
                days_of_week_mask,
                period,
                synchro,
                frequency,
                ..
            } = page
            {
                schedule.programs.push(Program {
                    program: *program,
                    name: format!("PGM {}", char::from(b'A' + program)),
                    frequency: *frequency,
                    days_of_week: match frequency {
                        ProgramFrequency::Custom => weekdays(*days_of_week_mask),
                        _ => Vec::new(),
                    },
                    period: match frequency {
                        ProgramFrequency::Cyclic => Some(*period),
                        _ => None,
                    },
                    synchro: *synchro,
                    starts: starts.remove(program).unwrap_or_default(),
                    durations: durations.remove(program).unwrap_or_default(),
                });
            }
        }
        Ok(schedule)
    }
}

fn start_times(raw: &[u16]) -> Vec<NaiveTime> {
    raw.iter()
        .filter(|&&minutes| minutes != START_TIME_DISABLED)
        .filter_map(|&minutes| {
            NaiveTime::from_hms_opt(u32::from(minutes / 60), u32::from(minutes % 60), 0)
        })
        .collect()
}

const WEEK_FROM_SUNDAY: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn weekdays(mask: u8) -> Vec<Weekday> {
    WEEK_FROM_SUNDAY
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1u8 << *bit) != 0)
        .map(|(_, day)| *day)
        .collect()
}
