use std::cmp::Ordering;

use crate::domain::{Connection, Photo};
use crate::geodesy::{bearing, haversine};

/// Largest elevation difference (meters, either direction) between connected photos.
pub const MAX_ELEVATION_DELTA: f64 = 5.0;
/// Largest horizontal distance (meters) between connected photos.
pub const MAX_DISTANCE: f64 = 10.0;

/// Candidate edge from `from` to `to`, or `None` when the pair fails the proximity gate.
pub fn find_connection(from: &Photo, to: &Photo) -> Option<Connection> {
    let (lat1, lon1) = (from.latitude.value(), from.longitude.value());
    let (lat2, lon2) = (to.latitude.value(), to.longitude.value());

    let distance = haversine(lon1, lat1, lon2, lat2);
    let elevation = to.elevation.value() - from.elevation.value();

    if !(-MAX_ELEVATION_DELTA..=MAX_ELEVATION_DELTA).contains(&elevation) || distance > MAX_DISTANCE {
        return None;
    }

    let pitch = if distance == 0.0 { 0.0 } else { elevation / distance };

    Some(Connection {
        photo_id: to.photo_id.clone(),
        distance,
        elevation,
        pitch,
        heading: bearing((lat1, lon1), (lat2, lon2)),
        adjusted_heading: None,
    })
}

/// Temporal order used for the walk: capture time, then photo id.
fn walk_order(a: &Photo, b: &Photo) -> Ordering {
    a.taken.cmp(&b.taken).then_with(|| a.photo_id.cmp(&b.photo_id))
}

/// Recompute every photo's connections and heading from scratch.
///
/// Each photo is linked to every other photo within the proximity gate. Its
/// heading points at its temporal successor (earliest later capture time,
/// lowest photo id on ties). A photo without a successor inherits the heading
/// of the photo walked just before it. When a heading is known, every edge
/// also gets `adjusted_heading = heading - edge.heading`.
///
/// The result depends only on the set of photos, not on slice order.
pub fn build_connections(photos: &mut [Photo]) {
    let mut order: Vec<usize> = (0..photos.len()).collect();
    order.sort_by(|&a, &b| walk_order(&photos[a], &photos[b]));

    let mut computed: Vec<(usize, Option<f64>, Vec<Connection>)> = Vec::with_capacity(photos.len());
    let mut previous_heading: Option<Option<f64>> = None;

    for &xi in &order {
        let x = &photos[xi];
        let mut connections = Vec::new();
        let mut successor: Option<&Photo> = None;

        for &yi in &order {
            if yi == xi {
                continue;
            }
            let y = &photos[yi];

            if y.taken > x.taken
                && successor.map_or(true, |s| walk_order(y, s) == Ordering::Less)
            {
                successor = Some(y);
            }

            if let Some(connection) = find_connection(x, y) {
                connections.push(connection);
            }
        }

        let heading = match (successor, previous_heading) {
            (Some(next), _) => Some(bearing(
                (x.latitude.value(), x.longitude.value()),
                (next.latitude.value(), next.longitude.value()),
            )),
            (None, Some(inherited)) => inherited,
            (None, None) => None,
        };

        if let Some(h) = heading {
            for connection in &mut connections {
                connection.adjusted_heading = Some(h - connection.heading);
            }
        }

        previous_heading = Some(heading);
        computed.push((xi, heading, connections));
    }

    for (index, heading, connections) in computed {
        photos[index].heading = heading;
        photos[index].connections = connections;
    }
}
