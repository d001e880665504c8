//! Ensemble forecast run variables.
//!
//! A forecast task is identified by its run date (`YMD`, optionally shifted by
//! `DELTA_DAY`), the base time of the forcing (`EMOS_BASE`) and the ensemble
//! size. From those the task derives neighbouring dates, the member list used
//! for MARS retrievals, and the run's directories under the suite workdir.

use crate::context::VarMap;
use crate::error::{EcfjobError, Result};
use chrono::{Datelike, NaiveDate, TimeDelta};

/// Ensemble members when `MEMBERS` is not set.
pub const DEFAULT_MEMBERS: u32 = 51;

/// Largest ensemble whose member ids fit in two digits.
pub const MAX_MEMBERS: u32 = 100;

/// Forcing base time when `EMOS_BASE` is not set.
pub const DEFAULT_BASE: &str = "00";

const DATE_FORMAT: &str = "%Y%m%d";

/// One ensemble forecast run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsembleRun {
    /// Run date, already shifted by `DELTA_DAY`.
    pub date: NaiveDate,
    pub base: String,
    /// Member handled by this task.
    pub member: u32,
    /// Size of the ensemble.
    pub members: u32,
    /// Suite work directory runs are placed under.
    pub workdir: String,
}

impl EnsembleRun {
    /// Read the run from task variables.
    ///
    /// Returns `Ok(None)` when the task has no run date (`YMD` unset or `none`).
    pub fn from_vars(vars: &VarMap, suite_workdir: &str) -> Result<Option<Self>> {
        let ymd = match vars.get("YMD").map(|v| v.trim()) {
            None | Some("") | Some("none") => return Ok(None),
            Some(ymd) => ymd,
        };

        let date = NaiveDate::parse_from_str(ymd, DATE_FORMAT).map_err(|e| {
            EcfjobError::UserError(format!("YMD must be a YYYYMMDD date, got '{}': {}", ymd, e))
        })?;

        let delta: i64 = parse_or(vars, "DELTA_DAY", 0)?;
        let date = shift(date, delta).ok_or_else(|| {
            EcfjobError::UserError(format!("YMD {} shifted by {} days is out of range", ymd, delta))
        })?;

        let members: u32 = parse_or(vars, "MEMBERS", DEFAULT_MEMBERS)?;
        if members == 0 {
            return Err(EcfjobError::UserError(
                "MEMBERS must be greater than 0".to_string(),
            ));
        }
        if members > MAX_MEMBERS {
            return Err(EcfjobError::UserError(format!(
                "MEMBERS must be at most {}, got {}",
                MAX_MEMBERS, members
            )));
        }

        Ok(Some(Self {
            date,
            base: vars
                .get("EMOS_BASE")
                .filter(|b| !b.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_BASE.to_string()),
            member: parse_or(vars, "MEMBER", 0)?,
            members,
            workdir: suite_workdir.trim_end_matches('/').to_string(),
        }))
    }

    pub fn ymd(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// Run date followed by the base time, e.g. `2024061500`.
    pub fn basetime(&self) -> String {
        format!("{}{}", self.ymd(), self.base)
    }

    /// Forecast directory of this run.
    pub fn fcdir(&self) -> String {
        format!("{}/fc/{}", self.workdir, self.basetime())
    }

    /// Directory the GRIB forcing is retrieved to.
    pub fn inputdir(&self) -> String {
        format!("{}/grib/{}", self.workdir, self.basetime())
    }

    /// Two-digit member numbers, `00` to `members - 1`.
    pub fn member_ids(&self) -> Vec<String> {
        (0..self.members).map(|m| format!("{:02}", m)).collect()
    }

    /// The run as task variables.
    pub fn vars(&self) -> Vec<(String, String)> {
        let prev = ymd_offset(self.date, -1);
        let prev2 = ymd_offset(self.date, -2);
        let next = ymd_offset(self.date, 1);
        let ymd = self.ymd();
        let fcdir = self.fcdir();

        let mut vars = vec![
            ("ens_ymd", ymd.clone()),
            ("ens_base", self.base.clone()),
            ("ens_basetime", self.basetime()),
            ("ens_pymd", prev.clone()),
            ("ens_pymd1", prev2),
            ("ens_nymd", next),
            (
                "ens_dow_num",
                self.date.weekday().number_from_monday().to_string(),
            ),
            ("ens_dow", self.date.format("%a").to_string()),
            ("ens_year", ymd[0..4].to_string()),
            ("ens_month", ymd[4..6].to_string()),
            ("ens_day", ymd[6..8].to_string()),
            (
                "ens_dmy",
                format!("{}/{}/{}", &ymd[6..8], &ymd[4..6], &ymd[0..4]),
            ),
        ];
        if prev.len() == 8 {
            vars.push(("ens_pyear", prev[0..4].to_string()));
            vars.push(("ens_pmonth", prev[4..6].to_string()));
            vars.push(("ens_pday", prev[6..8].to_string()));
        }
        vars.extend([
            ("ens_workdir", self.workdir.clone()),
            ("ens_inputdir", self.inputdir()),
            ("ens_fcdir", fcdir.clone()),
            ("ens_rapid_input", format!("{}/input", fcdir)),
            ("ens_rapid_output", format!("{}/output", fcdir)),
            ("ens_member", self.member.to_string()),
            ("ens_nmembers", self.members.to_string()),
            ("ens_members", self.member_ids().join(" ")),
            ("ens_mars_members", self.member_ids().join("/")),
        ]);

        vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    TimeDelta::try_days(days).and_then(|d| date.checked_add_signed(d))
}

fn ymd_offset(date: NaiveDate, days: i64) -> String {
    shift(date, days)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_or<T: std::str::FromStr>(vars: &VarMap, key: &str, default: T) -> Result<T> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| {
            EcfjobError::UserError(format!("{} must be a number, got '{}'", key, v))
        }),
    }
}
