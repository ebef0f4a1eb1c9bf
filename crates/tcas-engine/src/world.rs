//! World generation: airports on concentric rings, planes distributed
//! across them.

use std::f64::consts::PI;
use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use tcas_core::models::{Plane, TcasCapability};
use tcas_core::serial::serial;
use tcas_core::spatial::Coordinate;

use crate::config::SimConfig;
use crate::state::Airport;

/// Build the airport population for `config.plane_count` planes.
///
/// Airport 0 sits at the origin; later airports fill concentric rings
/// of 3, 6, 9, … with a random rotation per ring and radii drawn from
/// widening stage bands. Planes are handed out airport by airport in
/// small random batches until the requested count is reached.
pub fn build_world(config: &SimConfig, rng: &mut ChaCha8Rng) -> Vec<Arc<Airport>> {
    let total = config.plane_count;
    let mut capacities = Vec::new();
    let mut planes_created = 0u32;

    while planes_created < total {
        let capacity = plane_capacity(total, planes_created, rng);
        capacities.push(capacity);
        planes_created += capacity;
    }

    let locations = ring_coordinates(capacities.len(), rng);

    let mut airports = Vec::with_capacity(capacities.len());
    let mut plane_index = 0u32;
    for (i, (&capacity, location)) in capacities.iter().zip(locations).enumerate() {
        let parked = (0..capacity)
            .map(|_| {
                let plane = Plane::new(serial("p", plane_index), TcasCapability::draw(rng));
                plane_index += 1;
                plane
            })
            .collect();

        airports.push(Arc::new(Airport::new(
            serial("ap", i as u32),
            location,
            rng.gen_range(1..=3),
            parked,
        )));
    }

    airports
}

/// How many planes the next airport should start with. Band sizes
/// depend on the total so small worlds spread planes across several
/// airports while large worlds fill quickly.
fn plane_capacity(total: u32, created: u32, rng: &mut ChaCha8Rng) -> u32 {
    let remaining = total - created;
    if total < 20 {
        if remaining <= 3 {
            remaining
        } else {
            rng.gen_range(1..=2)
        }
    } else if total < 100 {
        if remaining <= 6 {
            remaining
        } else {
            rng.gen_range(1..=5)
        }
    } else if remaining <= 30 {
        remaining
    } else {
        rng.gen_range(10..=29)
    }
}

/// Ground locations for `count` airports: the origin, then rings of
/// 3, 6, 9, … points. Ring `k` uses radii in `[150 + 250k, 250 + 300k]`
/// and starts at a random rotation so worlds never line up.
fn ring_coordinates(count: usize, rng: &mut ChaCha8Rng) -> Vec<Coordinate> {
    let mut points = Vec::with_capacity(count);
    if count == 0 {
        return points;
    }

    points.push(Coordinate::ORIGIN);

    let mut ring_size = 3usize;
    let mut min_radius = 150.0;
    let mut max_radius = 250.0;

    while points.len() < count {
        let angle_increment = 360.0 / ring_size as f64;
        let offset: f64 = rng.gen_range(0.0..360.0);

        for j in 0..ring_size {
            if points.len() >= count {
                break;
            }
            let radius = rng.gen_range(min_radius..max_radius);
            let angle_rad = (j as f64 * angle_increment + offset) * (PI / 180.0);
            points.push(Coordinate::new(
                radius * angle_rad.cos(),
                radius * angle_rad.sin(),
                0.0,
            ));
        }

        ring_size += 3;
        min_radius += 250.0;
        max_radius += 300.0;
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(planes: u32) -> SimConfig {
        SimConfig::new(planes, false).expect("config")
    }

    #[test]
    fn all_planes_are_placed_exactly_once() {
        for &count in &[4u32, 19, 50, 150] {
            let mut rng = ChaCha8Rng::seed_from_u64(u64::from(count));
            let airports = build_world(&config(count), &mut rng);

            let placed: usize = airports.iter().map(|ap| ap.parked_count()).sum();
            assert_eq!(placed as u32, count);
        }
    }

    #[test]
    fn serials_are_sequential_and_prefixed() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let airports = build_world(&config(8), &mut rng);

        assert_eq!(airports[0].serial, "ap0");
        let mut seen = Vec::new();
        for airport in &airports {
            for plane in airport.lock().parked.iter() {
                seen.push(plane.serial.clone());
            }
        }
        let expected: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn first_airport_sits_at_the_origin() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let airports = build_world(&config(12), &mut rng);
        assert!(airports[0].location.approx_eq(Coordinate::ORIGIN));
    }

    #[test]
    fn ring_radii_stay_in_stage_bands() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let points = ring_coordinates(10, &mut rng);

        // First ring: 3 points in [150, 250); second: 6 in [400, 550).
        for p in &points[1..4] {
            let r = p.distance(Coordinate::ORIGIN);
            assert!((150.0..250.0).contains(&r), "first ring radius {r}");
        }
        for p in &points[4..10] {
            let r = p.distance(Coordinate::ORIGIN);
            assert!((400.0..550.0).contains(&r), "second ring radius {r}");
        }
    }

    #[test]
    fn runway_counts_are_between_one_and_three() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let airports = build_world(&config(40), &mut rng);
        assert!(airports
            .iter()
            .all(|ap| (1..=3).contains(&ap.runways_total)));
    }

    #[test]
    fn same_seed_builds_the_same_world() {
        let build = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            build_world(&config(25), &mut rng)
                .iter()
                .map(|ap| (ap.location, ap.runways_total, ap.parked_count()))
                .collect::<Vec<_>>()
        };
        assert_eq!(build(42), build(42));
    }
}
