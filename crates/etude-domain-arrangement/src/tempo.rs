use serde::{Deserialize, Serialize};

pub type Tick = i64; // musical time, monotonic in a track

pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub tick: Tick,
    pub us_per_quarter: u32,
}

/// Piecewise-constant tempo map. A map without a point at tick 0 starts at
/// 120 bpm.
#[derive(Clone, Debug)]
pub struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: Tick,
    start_us: i64,
    us_per_quarter: u32,
}

impl TempoMap {
    pub fn new(ppq: u16, mut points: Vec<TempoPoint>) -> Self {
        let ppq = ppq.max(1);
        points.sort_by_key(|p| p.tick);
        if points.first().map_or(true, |p| p.tick != 0) {
            points.insert(
                0,
                TempoPoint {
                    tick: 0,
                    us_per_quarter: DEFAULT_US_PER_QUARTER,
                },
            );
        }

        let mut segments = Vec::with_capacity(points.len());
        let mut current_us = 0i64;
        for (idx, point) in points.iter().enumerate() {
            if idx > 0 {
                let prev = &points[idx - 1];
                current_us += ticks_to_us(point.tick - prev.tick, prev.us_per_quarter, ppq);
            }
            segments.push(TempoSegment {
                start_tick: point.tick,
                start_us: current_us,
                us_per_quarter: point.us_per_quarter.max(1),
            });
        }

        Self { ppq, segments }
    }

    pub fn tick_to_micros(&self, tick: Tick) -> i64 {
        let seg = self.segment_for_tick(tick);
        seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq)
    }

    pub fn tick_to_seconds(&self, tick: Tick) -> f64 {
        self.tick_to_micros(tick) as f64 / 1_000_000.0
    }

    fn segment_for_tick(&self, tick: Tick) -> TempoSegment {
        let idx = self.segments.partition_point(|seg| seg.start_tick <= tick);
        self.segments[idx.saturating_sub(1)]
    }
}

fn ticks_to_us(ticks: Tick, us_per_quarter: u32, ppq: u16) -> i64 {
    (ticks as i128 * us_per_quarter as i128 / ppq as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tempo_is_120_bpm() {
        let map = TempoMap::new(480, Vec::new());
        assert_eq!(map.tick_to_micros(480), 500_000);
    }

    #[test]
    fn tempo_change_applies_from_its_tick() {
        let map = TempoMap::new(
            480,
            vec![
                TempoPoint {
                    tick: 0,
                    us_per_quarter: 500_000,
                },
                TempoPoint {
                    tick: 960,
                    us_per_quarter: 1_000_000,
                },
            ],
        );
        assert_eq!(map.tick_to_micros(960), 1_000_000);
        assert_eq!(map.tick_to_micros(1440), 2_000_000);
    }
}
