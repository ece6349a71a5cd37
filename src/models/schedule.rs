use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::core::error::Error;
use crate::models::{FinId, Model};

/// One trading phase of a market's schedule group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(alias = "FinID")]
    pub fin_id: FinId,
    #[serde(alias = "Schedule Group", default)]
    pub schedule_group: Option<String>,
    #[serde(alias = "Schedule Group Memo", default)]
    pub schedule_group_memo: Option<String>,
    #[serde(alias = "Timezone", default)]
    pub timezone: Option<String>,
    #[serde(alias = "Phase Type", default)]
    pub phase_type: Option<String>,
    #[serde(alias = "Phase Name", default)]
    pub phase_name: Option<String>,
    #[serde(alias = "Phase Memo", default)]
    pub phase_memo: Option<String>,
    #[serde(alias = "Days", default)]
    pub days: Option<String>,
    #[serde(alias = "Start", default)]
    pub start: Option<String>,
    #[serde(alias = "End", default)]
    pub end: Option<String>,
    #[serde(alias = "Offset Days", default)]
    pub offset_days: Option<String>,
    #[serde(alias = "Duration", default)]
    pub duration: Option<String>,
    #[serde(alias = "Min Start", default)]
    pub min_start: Option<String>,
    #[serde(alias = "Max Start", default)]
    pub max_start: Option<String>,
    #[serde(alias = "Min End", default)]
    pub min_end: Option<String>,
    #[serde(alias = "Max End", default)]
    pub max_end: Option<String>,
    #[serde(alias = "In Force Start Date", default)]
    pub in_force_start_date: Option<String>,
    #[serde(alias = "In Force End Date", default)]
    pub in_force_end_date: Option<String>,
    #[serde(alias = "Season Start", default)]
    pub season_start: Option<String>,
    #[serde(alias = "Season End", default)]
    pub season_end: Option<String>,
}

impl Model for Schedule {
    const NAME: &'static str = "Schedule";
    const FIELDS: &'static [&'static str] = &[
        "fin_id",
        "schedule_group",
        "schedule_group_memo",
        "timezone",
        "phase_type",
        "phase_name",
        "phase_memo",
        "days",
        "start",
        "end",
        "offset_days",
        "duration",
        "min_start",
        "max_start",
        "min_end",
        "max_end",
        "in_force_start_date",
        "in_force_end_date",
        "season_start",
        "season_end",
    ];
}

impl Schedule {
    /// Every schedule row of one market, in file order.
    pub fn for_market(catalog: &mut Catalog, fin_id: &FinId) -> Result<Vec<Self>, Error> {
        catalog.list_cluster::<Self>(fin_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Schedule;
    use crate::models::Model;

    #[test]
    fn schedule_rows_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedules.csv");
        std::fs::write(
            &path,
            "FinID,Schedule Group,Timezone,Phase Type,Days,Start,End,Offset Days\n\
             US.NYSE,Regular,America/New_York,Primary Trading Session,Mon-Fri,09:30,16:00,0\n\
             US.NYSE,Regular,America/New_York,Post-Trading Session,Mon-Fri,16:00,20:00,0\n",
        )
        .expect("write");

        let rows: Vec<Schedule> = Schedule::from_csv(&path)
            .expect("open")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].phase_type.as_deref(), Some("Post-Trading Session"));
        assert_eq!(rows[0].season_end, None);
    }

    #[test]
    fn tuple_round_trip() {
        let text = |value: &str| Some(value.to_string());
        let schedule = Schedule {
            fin_id: "US.CME.EQUITY.USINDEX1".parse().expect("fin id"),
            schedule_group: text("Regular"),
            schedule_group_memo: text("Standard week"),
            timezone: text("America/Chicago"),
            phase_type: text("Primary Trading Session"),
            phase_name: text("Globex"),
            phase_memo: text("Overnight"),
            days: text("Sun-Thu"),
            start: text("17:00:00"),
            end: text("16:00:00"),
            offset_days: text("1"),
            duration: text("82800"),
            min_start: text("16:55:00"),
            max_start: text("17:05:00"),
            min_end: text("15:55:00"),
            max_end: text("16:05:00"),
            in_force_start_date: text("2023-01-01"),
            in_force_end_date: text("2023-12-31"),
            season_start: text("03-12"),
            season_end: text("11-05"),
        };
        let tuple = schedule.to_tuple().expect("tuple");
        assert_eq!(tuple.len(), Schedule::FIELDS.len());
        assert_eq!(tuple[10], "1");
        assert_eq!(tuple[19], "11-05");
        assert_eq!(Schedule::from_tuple(tuple).expect("decode"), schedule);
    }
}
