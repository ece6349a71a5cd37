use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::catalog::Catalog;
use crate::core::error::{Error, ErrorKind};
use crate::models::phase::{Phase, PhaseGenerator, parse_date};
use crate::models::{FinId, Model, Schedule};

/// Group used on a holiday whose row names no schedule.
const CLOSED_GROUP: &str = "Closed";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Market {
    #[serde(alias = "FinID")]
    pub fin_id: FinId,
    #[serde(alias = "Exchange", default)]
    pub exchange: Option<String>,
    #[serde(alias = "Market", default)]
    pub market: Option<String>,
    #[serde(alias = "Security Group", default)]
    pub security_group: Option<String>,
    #[serde(alias = "Timezone", default)]
    pub timezone: Option<String>,
    #[serde(alias = "Weekend Definition", default)]
    pub weekend_definition: Option<String>,
    #[serde(alias = "MIC", default)]
    pub mic: Option<String>,
    #[serde(alias = "Acronym", default)]
    pub acronym: Option<String>,
    #[serde(alias = "Asset Type", default)]
    pub asset_type: Option<String>,
    #[serde(alias = "Memo", default)]
    pub memo: Option<String>,
    #[serde(alias = "Permanently Closed", default)]
    pub permanently_closed: Option<String>,
    #[serde(alias = "Replaced By", default)]
    pub replaced_by: Option<String>,
}

impl Model for Market {
    const NAME: &'static str = "Market";
    const FIELDS: &'static [&'static str] = &[
        "fin_id",
        "exchange",
        "market",
        "security_group",
        "timezone",
        "weekend_definition",
        "mic",
        "acronym",
        "asset_type",
        "memo",
        "permanently_closed",
        "replaced_by",
    ];
}

impl Market {
    /// Looks a market up by FinID in its country cluster.
    pub fn get(catalog: &mut Catalog, fin_id: &FinId) -> Result<Option<Self>, Error> {
        catalog.get::<Self>(fin_id.as_str(), Some(fin_id.country()))
    }

    /// Holidays of this market with dates in `start..=end` (ISO dates), in file order.
    pub fn list_holidays(
        &self,
        catalog: &mut Catalog,
        start: &str,
        end: &str,
    ) -> Result<Vec<MarketHoliday>, Error> {
        Ok(catalog
            .filter::<MarketHoliday>(start, end, Some(self.fin_id.as_str()))?
            .collect())
    }

    /// Trading phases of every day in `start..=end` (ISO dates), in start order per day.
    ///
    /// Holidays pick the schedule group of their day; phases that begin on an
    /// earlier day and run past midnight are reported on each day they reach.
    pub fn generate_schedules(
        &self,
        catalog: &mut Catalog,
        start: &str,
        end: &str,
    ) -> Result<Vec<Phase>, Error> {
        let first = parse_date(start).map_err(|err| usage(err, start))?;
        let last = parse_date(end).map_err(|err| usage(err, end))?;
        if first > last {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("range start {start} is after end {end}")));
        }

        let schedules = Schedule::for_market(catalog, &self.fin_id)?;
        let generator = PhaseGenerator::new(self.fin_id.clone(), &schedules)?;
        let from = first
            .checked_sub(Duration::days(i64::from(generator.lookback())))
            .unwrap_or(first);
        let mut holiday_groups = HashMap::new();
        for holiday in self.list_holidays(catalog, &from.to_string(), &last.to_string())? {
            let group = holiday.schedule.unwrap_or_else(|| CLOSED_GROUP.to_string());
            holiday_groups.insert(parse_date(&holiday.date)?, group);
        }
        let phases = generator.generate(&holiday_groups, first, last)?;
        tracing::debug!(
            fin_id = %self.fin_id,
            start,
            end,
            schedules = schedules.len(),
            holidays = holiday_groups.len(),
            phases = phases.len(),
            "generated schedules"
        );
        Ok(phases)
    }
}

fn usage(err: Error, value: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid date {value:?}"))
        .with_hint("Dates look like YYYY-MM-DD, e.g. 2023-11-24.")
        .with_source(err)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MarketHoliday {
    #[serde(alias = "FinID")]
    pub fin_id: FinId,
    #[serde(alias = "Date")]
    pub date: String,
    #[serde(alias = "Holiday Name", default)]
    pub holiday_name: Option<String>,
    #[serde(alias = "Schedule", default)]
    pub schedule: Option<String>,
    #[serde(alias = "Settlement", default)]
    pub settlement: Option<String>,
    #[serde(alias = "Status", default)]
    pub status: Option<String>,
    #[serde(alias = "Observed", default)]
    pub observed: Option<String>,
    #[serde(alias = "Memo", default)]
    pub memo: Option<String>,
}

impl Model for MarketHoliday {
    const NAME: &'static str = "MarketHoliday";
    const FIELDS: &'static [&'static str] = &[
        "fin_id",
        "date",
        "holiday_name",
        "schedule",
        "settlement",
        "status",
        "observed",
        "memo",
    ];
}
