#![no_main]
use libfuzzer_sys::fuzz_target;
use ssp_trajectory_model::{ScheduleTime, MAX_SCHEDULE_HOUR};

fuzz_target!(|data: &str| {
    if let Ok(time) = ScheduleTime::parse(data) {
        assert!((0..=MAX_SCHEDULE_HOUR).contains(&time.hours()));
        assert!((0..60).contains(&time.minutes()));
        assert!((0..60).contains(&time.seconds()));
        let reparsed = ScheduleTime::parse(&time.to_string()).ok();
        assert_eq!(reparsed, Some(time));
    }
});
