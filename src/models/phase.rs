//! Purpose: Expand a market's schedule rows into dated trading phases.
//! Exports: `Phase`, `PhaseGenerator`, `parse_date`.
//! Role: Calendar arithmetic behind `Market::generate_schedules`.
//! Invariants: A day's schedule group is its holiday's `schedule`, or `Regular`.
//! Invariants: Phases are reported in start order; ties keep schedule file order.
//! Invariants: A phase with `offset_days = n` is also reported on the `n` following days.
use std::collections::HashMap;

use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::core::error::{Error, ErrorKind};
use crate::models::{FinId, Schedule};

/// Group used on days without a holiday entry.
pub const REGULAR_GROUP: &str = "Regular";

const DAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// One concrete occurrence of a schedule row.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Phase {
    pub fin_id: FinId,
    /// Day this phase is reported for.
    pub date: Date,
    pub schedule_group: Option<String>,
    pub phase_type: Option<String>,
    pub phase_name: Option<String>,
    pub timezone: Option<String>,
    /// Wall-clock start in the market timezone.
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
}

/// A schedule row with its calendar columns parsed.
#[derive(Debug)]
struct Rule<'a> {
    schedule: &'a Schedule,
    days: [bool; 7],
    offset: u32,
    start: (Time, u32),
    end: (Time, u32),
    in_force: (Option<Date>, Option<Date>),
    season: Option<((u8, u8), (u8, u8))>,
}

impl Rule<'_> {
    fn runs_on(&self, day: Date) -> bool {
        if !self.days[usize::from(day.weekday().number_days_from_monday())] {
            return false;
        }
        let (from, until) = self.in_force;
        if from.is_some_and(|from| day < from) || until.is_some_and(|until| day > until) {
            return false;
        }
        match self.season {
            None => true,
            Some((first, last)) => {
                let today = (u8::from(day.month()), day.day());
                if first <= last {
                    first <= today && today <= last
                } else {
                    today >= first || today <= last
                }
            }
        }
    }

    fn in_group(&self, group: &str) -> bool {
        self.schedule
            .schedule_group
            .as_deref()
            .unwrap_or(REGULAR_GROUP)
            .eq_ignore_ascii_case(group)
    }
}

/// Parsed schedule rows of one market.
#[derive(Debug)]
pub struct PhaseGenerator<'a> {
    fin_id: FinId,
    rules: Vec<Rule<'a>>,
}

impl<'a> PhaseGenerator<'a> {
    /// Parses the calendar columns of `schedules`; a malformed row is `Corrupt`.
    pub fn new(fin_id: FinId, schedules: &'a [Schedule]) -> Result<Self, Error> {
        let rules = schedules
            .iter()
            .map(|schedule| parse_rule(schedule).map_err(|err| err.with_hint(row_hint(schedule))))
            .collect::<Result<_, _>>()?;
        Ok(Self { fin_id, rules })
    }

    /// Largest `offset_days` of any row: how many days earlier a phase can begin.
    pub fn lookback(&self) -> u32 {
        self.rules.iter().map(|rule| rule.offset).max().unwrap_or(0)
    }

    /// Phases for every day in `start..=end`.
    ///
    /// `holiday_groups` maps a holiday date to the schedule group used on it.
    pub fn generate(
        &self,
        holiday_groups: &HashMap<Date, String>,
        start: Date,
        end: Date,
    ) -> Result<Vec<Phase>, Error> {
        let mut phases = Vec::new();
        let mut day = start;
        while day <= end {
            phases.extend(self.phases_on(holiday_groups, day)?);
            match day.next_day() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(phases)
    }

    fn phases_on(
        &self,
        holiday_groups: &HashMap<Date, String>,
        day: Date,
    ) -> Result<Vec<Phase>, Error> {
        let mut found = Vec::new();
        for back in (0..=self.lookback()).rev() {
            let Some(origin) = day.checked_sub(Duration::days(i64::from(back))) else {
                continue;
            };
            let group = holiday_groups
                .get(&origin)
                .map(String::as_str)
                .unwrap_or(REGULAR_GROUP);
            for rule in &self.rules {
                if rule.offset < back || !rule.in_group(group) || !rule.runs_on(origin) {
                    continue;
                }
                let start = at(origin, rule.start)?;
                let end = at(origin, (rule.end.0, rule.end.1 + rule.offset))?;
                let schedule = rule.schedule;
                found.push(Phase {
                    fin_id: self.fin_id.clone(),
                    date: day,
                    schedule_group: schedule.schedule_group.clone(),
                    phase_type: schedule.phase_type.clone(),
                    phase_name: schedule.phase_name.clone(),
                    timezone: schedule.timezone.clone(),
                    start,
                    end,
                });
            }
        }
        found.sort_by_key(|phase| phase.start);
        Ok(found)
    }
}

fn at(origin: Date, (time, days): (Time, u32)) -> Result<PrimitiveDateTime, Error> {
    origin
        .checked_add(Duration::days(i64::from(days)))
        .map(|date| PrimitiveDateTime::new(date, time))
        .ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message(format!("date out of range after {origin}"))
        })
}

fn row_hint(schedule: &Schedule) -> String {
    format!(
        "Check the {} schedule row {:?}.",
        schedule.fin_id,
        schedule.phase_type.as_deref().unwrap_or_default()
    )
}

fn parse_rule(schedule: &Schedule) -> Result<Rule<'_>, Error> {
    let offset = match schedule.offset_days.as_deref() {
        None => 0,
        Some(text) => text.trim().parse::<u32>().map_err(|err| {
            corrupt(format!("invalid offset days {text:?}")).with_source(err)
        })?,
    };
    let season = match (schedule.season_start.as_deref(), schedule.season_end.as_deref()) {
        (Some(first), Some(last)) => Some((month_day(first)?, month_day(last)?)),
        (None, None) => None,
        _ => return Err(corrupt("season needs both a start and an end")),
    };
    Ok(Rule {
        schedule,
        days: parse_days(schedule.days.as_deref().unwrap_or_default())?,
        offset,
        start: parse_clock(required(schedule.start.as_deref(), "start")?)?,
        end: parse_clock(required(schedule.end.as_deref(), "end")?)?,
        in_force: (
            schedule.in_force_start_date.as_deref().map(parse_date).transpose()?,
            schedule.in_force_end_date.as_deref().map(parse_date).transpose()?,
        ),
        season,
    })
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

fn required<'s>(value: Option<&'s str>, column: &str) -> Result<&'s str, Error> {
    value.ok_or_else(|| corrupt(format!("schedule row has no {column} time")))
}

/// Parses a zero-padded ISO date such as `2023-11-24`.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    let invalid = || corrupt(format!("invalid date {text:?}"));
    let mut parts = text.trim().splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let year = year.parse::<i32>().map_err(|err| invalid().with_source(err))?;
    let month = month.parse::<u8>().map_err(|err| invalid().with_source(err))?;
    let day = day.parse::<u8>().map_err(|err| invalid().with_source(err))?;
    let month = Month::try_from(month).map_err(|err| invalid().with_source(err))?;
    Date::from_calendar_date(year, month, day).map_err(|err| invalid().with_source(err))
}

/// `MM-DD`, or the month and day of a full ISO date.
fn month_day(text: &str) -> Result<(u8, u8), Error> {
    let text = text.trim();
    if text.matches('-').count() == 2 {
        let date = parse_date(text)?;
        return Ok((u8::from(date.month()), date.day()));
    }
    let invalid = || corrupt(format!("invalid season boundary {text:?}"));
    let (month, day) = text.split_once('-').ok_or_else(invalid)?;
    let month = month.parse::<u8>().map_err(|err| invalid().with_source(err))?;
    let day = day.parse::<u8>().map_err(|err| invalid().with_source(err))?;
    let month = Month::try_from(month).map_err(|err| invalid().with_source(err))?;
    Date::from_calendar_date(2000, month, day).map_err(|err| invalid().with_source(err))?;
    Ok((u8::from(month), day))
}

/// `HH:MM` or `HH:MM:SS`; `24:00` is midnight of the following day.
fn parse_clock(text: &str) -> Result<(Time, u32), Error> {
    let invalid = || corrupt(format!("invalid time {text:?}"));
    let mut fields = [0u8; 3];
    let parts: Vec<&str> = text.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.parse::<u8>().map_err(|err| invalid().with_source(err))?;
    }
    let [hour, minute, second] = fields;
    if hour == 24 && minute == 0 && second == 0 {
        return Ok((Time::MIDNIGHT, 1));
    }
    let time = Time::from_hms(hour, minute, second).map_err(|err| invalid().with_source(err))?;
    Ok((time, 0))
}

/// Comma-separated day names or ranges, e.g. `Mon-Fri` or `Sun-Thu,Sat`.
fn parse_days(text: &str) -> Result<[bool; 7], Error> {
    let mut days = [false; 7];
    for token in text.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        match token.split_once('-') {
            None => days[day_index(token)?] = true,
            Some((first, last)) => {
                let (mut index, last) = (day_index(first)?, day_index(last)?);
                days[index] = true;
                while index != last {
                    index = (index + 1) % 7;
                    days[index] = true;
                }
            }
        }
    }
    Ok(days)
}

fn day_index(name: &str) -> Result<usize, Error> {
    let name = name.trim().to_ascii_lowercase();
    DAY_NAMES
        .iter()
        .position(|day| name.len() >= 3 && day.starts_with(name.as_str()))
        .ok_or_else(|| corrupt(format!("unknown day {name:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use time::{Date, Month};

    use super::{PhaseGenerator, parse_clock, parse_date, parse_days};
    use crate::core::error::ErrorKind;
    use crate::models::Schedule;

    fn row(
        group: &str,
        phase_type: &str,
        days: &str,
        start: &str,
        end: &str,
        offset: u32,
    ) -> Schedule {
        let text = |value: &str| Some(value.to_string());
        Schedule {
            fin_id: "US.TEST".parse().expect("fin id"),
            schedule_group: text(group),
            schedule_group_memo: None,
            timezone: text("America/New_York"),
            phase_type: text(phase_type),
            phase_name: None,
            phase_memo: None,
            days: text(days),
            start: text(start),
            end: text(end),
            offset_days: text(&offset.to_string()),
            duration: None,
            min_start: None,
            max_start: None,
            min_end: None,
            max_end: None,
            in_force_start_date: None,
            in_force_end_date: None,
            season_start: None,
            season_end: None,
        }
    }

    fn date(text: &str) -> Date {
        parse_date(text).expect("date")
    }

    fn types_on(
        schedules: &[Schedule],
        holidays: &HashMap<Date, String>,
        day: &str,
    ) -> Vec<String> {
        let generator =
            PhaseGenerator::new("US.TEST".parse().expect("fin id"), schedules).expect("rules");
        generator
            .generate(holidays, date(day), date(day))
            .expect("generate")
            .into_iter()
            .map(|phase| phase.phase_type.unwrap_or_default())
            .collect()
    }

    #[test]
    fn day_lists_and_wrapping_ranges() {
        let weekdays = parse_days("Mon-Fri").expect("weekdays");
        assert_eq!(weekdays, [true, true, true, true, true, false, false]);
        let wrapped = parse_days("Sun-Thu").expect("wrapped");
        assert_eq!(wrapped, [true, true, true, true, false, false, true]);
        let listed = parse_days("Tue, Sat").expect("listed");
        assert_eq!(listed, [false, true, false, false, false, true, false]);
        assert!(parse_days("monday").expect("full name")[0]);
        assert!(parse_days("Thurs").expect("long abbreviation")[3]);
        let err = parse_days("Mon-Xyz").expect_err("unknown day");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn clock_times_accept_seconds_and_end_of_day() {
        assert_eq!(parse_clock("09:30").expect("clock").1, 0);
        let (time, days) = parse_clock("24:00:00").expect("clock");
        assert_eq!((time.hour(), days), (0, 1));
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("9").is_err());
    }

    #[test]
    fn iso_dates_parse_strictly() {
        let expected = Date::from_calendar_date(2023, Month::November, 24).expect("date");
        assert_eq!(date("2023-11-24"), expected);
        assert!(parse_date("2023-02-30").is_err());
        assert!(parse_date("20231124").is_err());
    }

    #[test]
    fn weekdays_outside_days_have_no_phases() {
        let rows = vec![row(
            "Regular",
            "Primary Trading Session",
            "Mon-Fri",
            "09:30",
            "16:00",
            0,
        )];
        let none = HashMap::new();
        let wednesday = types_on(&rows, &none, "2023-11-15");
        assert_eq!(wednesday, vec!["Primary Trading Session"]);
        assert!(types_on(&rows, &none, "2023-11-11").is_empty());
    }

    #[test]
    fn holiday_selects_its_schedule_group() {
        let rows = vec![
            row("Regular", "Primary Trading Session", "Mon-Fri", "09:30", "16:00", 0),
            row("Regular", "Post-Trading Session", "Mon-Fri", "16:00", "20:00", 0),
            row("irregular", "Primary Trading Session", "Mon-Fri", "09:30", "13:00", 0),
        ];
        let mut holidays = HashMap::new();
        holidays.insert(date("2023-11-24"), "Irregular".to_string());
        holidays.insert(date("2023-11-23"), "Closed".to_string());

        let irregular = types_on(&rows, &holidays, "2023-11-24");
        assert_eq!(irregular, vec!["Primary Trading Session"]);
        assert!(types_on(&rows, &holidays, "2023-11-23").is_empty());
        assert_eq!(types_on(&rows, &holidays, "2023-11-22").len(), 2);
    }

    #[test]
    fn overnight_phase_is_carried_into_the_next_day() {
        let rows = vec![
            row("Regular", "Pre-Open", "Sun-Thu", "16:00", "17:00", 0),
            row("Regular", "Primary Trading Session", "Sun-Thu", "17:00", "16:00", 1),
        ];
        let generator =
            PhaseGenerator::new("US.TEST".parse().expect("fin id"), &rows).expect("rules");
        assert_eq!(generator.lookback(), 1);

        let phases = generator
            .generate(&HashMap::new(), date("2023-11-13"), date("2023-11-13"))
            .expect("generate");
        let types: Vec<_> = phases
            .iter()
            .map(|phase| phase.phase_type.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            types,
            vec!["Primary Trading Session", "Pre-Open", "Primary Trading Session"]
        );
        assert_eq!(phases[0].start.date(), date("2023-11-12"));
        assert_eq!(phases[0].end.date(), date("2023-11-13"));
        assert_eq!(phases[2].end.date(), date("2023-11-14"));
        assert!(phases.iter().all(|phase| phase.date == date("2023-11-13")));

        let mut holidays = HashMap::new();
        holidays.insert(date("2023-11-12"), "Closed".to_string());
        let generator =
            PhaseGenerator::new("US.TEST".parse().expect("fin id"), &rows).expect("rules");
        let phases = generator
            .generate(&holidays, date("2023-11-13"), date("2023-11-13"))
            .expect("generate");
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].phase_type.as_deref(), Some("Pre-Open"));
    }

    #[test]
    fn in_force_and_season_bound_a_row() {
        let mut summer = row("Regular", "Summer Session", "Mon-Fri", "09:00", "17:00", 0);
        summer.season_start = Some("03-12".to_string());
        summer.season_end = Some("11-05".to_string());
        let mut winter = row("Regular", "Winter Session", "Mon-Fri", "08:00", "16:00", 0);
        winter.season_start = Some("11-06".to_string());
        winter.season_end = Some("03-11".to_string());
        let mut retired = row("Regular", "Retired Session", "Mon-Fri", "18:00", "19:00", 0);
        retired.in_force_end_date = Some("2023-06-30".to_string());
        let rows = vec![summer, winter, retired];
        let none = HashMap::new();

        assert_eq!(types_on(&rows, &none, "2023-11-15"), vec!["Winter Session"]);
        assert_eq!(
            types_on(&rows, &none, "2023-01-10"),
            vec!["Winter Session", "Retired Session"]
        );
        assert_eq!(types_on(&rows, &none, "2023-07-12"), vec!["Summer Session"]);
    }

    #[test]
    fn range_covers_each_day_in_order() {
        let rows = vec![row("Regular", "Primary", "Mon-Fri", "09:30", "16:00", 0)];
        let generator =
            PhaseGenerator::new("US.TEST".parse().expect("fin id"), &rows).expect("rules");
        let phases = generator
            .generate(&HashMap::new(), date("2023-11-10"), date("2023-11-14"))
            .expect("generate");
        let days: Vec<String> = phases.iter().map(|phase| phase.date.to_string()).collect();
        assert_eq!(days, vec!["2023-11-10", "2023-11-13", "2023-11-14"]);
    }

    #[test]
    fn malformed_row_is_corrupt() {
        let rows = vec![row("Regular", "Primary", "Mon-Fri", "9h30", "16:00", 0)];
        let err = PhaseGenerator::new("US.TEST".parse().expect("fin id"), &rows)
            .expect_err("bad start");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(err.hint().expect("hint").contains("US.TEST"));
    }
}
