//! Metadata-vector construction and the custom sigmoid (`spec.md` §4.2,
//! §8 invariants 3 and 4).

/// Builds the 6-element metadata vector fed alongside the raw audio
/// window: `[lat, lon, week_encoded, mask_lat, mask_lon, mask_week]`.
///
/// Week encoding: a valid week (`1..=48`) is encoded as
/// `cos(week * 7.5deg) + 1`; an invalid week encodes as `-1` with its mask
/// bit cleared. Latitude/longitude of exactly `-1.0` is the sentinel for
/// "unknown," clearing the corresponding mask bit symmetrically.
pub fn convert_metadata(latitude: f64, longitude: f64, week: Option<u8>) -> [f32; 6] {
    let (lat, mask_lat) = if latitude == -1.0 { (-1.0, 0.0) } else { (latitude, 1.0) };
    let (lon, mask_lon) = if longitude == -1.0 { (-1.0, 0.0) } else { (longitude, 1.0) };

    let (week_encoded, mask_week) = match week {
        Some(w) if (1..=48).contains(&w) => {
            let degrees = f64::from(w) * 7.5;
            (degrees.to_radians().cos() + 1.0, 1.0)
        }
        _ => (-1.0, 0.0),
    };

    [
        lat as f32,
        lon as f32,
        week_encoded as f32,
        mask_lat,
        mask_lon,
        mask_week,
    ]
}

/// Maps a calendar date onto BirdNET's 48-week year (four fixed weeks per
/// month, the week of month clamped to `1..=4` so months with a 29th-31st
/// day don't spill into a 49th week).
pub fn birdnet_week(date: chrono::NaiveDate) -> u8 {
    use chrono::Datelike;

    let month = date.month0(); // 0..=11
    let week_of_month = ((date.day() - 1) / 7 + 1).min(4); // 1..=4
    (month * 4 + week_of_month) as u8
}

/// The custom sigmoid `sigma(x) = 1 / (1 + exp(-s*x))` applied to raw
/// model logits, parameterised by the configured sensitivity setting.
pub fn custom_sigmoid(x: f64, sensitivity: f64) -> f64 {
    1.0 / (1.0 + (-sensitivity * x).exp())
}
