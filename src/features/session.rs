//! Trading session and timing features (pure function of a UTC timestamp)

use super::vector::FeatureVector;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Half-open session windows in UTC hours
const SESSIONS: [(&str, u32, u32); 3] = [("asia", 0, 8), ("london", 8, 16), ("ny", 16, 24)];

/// CME Bitcoin futures close on Friday, 21:00 UTC
const CME_CLOSE_HOUR: u32 = 21;

/// Fill the session block of the feature vector
pub fn apply(vector: &mut FeatureVector, ts: DateTime<Utc>) {
    let hour = ts.hour();
    let minute = ts.minute();
    // Monday = 0 .. Sunday = 6
    let day_of_week = ts.weekday().num_days_from_monday();

    for (label, start_hour, end_hour) in SESSIONS {
        if (start_hour..end_hour).contains(&hour) {
            vector.session_label = label.to_string();
            vector.minutes_into_session = ((hour - start_hour) * 60 + minute) as i64;

            let session_duration = ((end_hour - start_hour) * 60) as i64;
            vector.minutes_until_session_close =
                session_duration - vector.minutes_into_session - 1;
            break;
        }
    }

    vector.hour_of_day = hour;
    vector.day_of_week = day_of_week;
    vector.weekend_flag = day_of_week >= 5;

    // Countdown to the Friday CME close, zero outside that window
    vector.cme_close_proximity = if day_of_week == 4 && hour < CME_CLOSE_HOUR {
        ((CME_CLOSE_HOUR - hour) * 60) as f64 - minute as f64
    } else {
        0.0
    };
}
