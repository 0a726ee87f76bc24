use std::{
    collections::{BTreeMap, BTreeSet},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use hifitime::prelude::{Duration, Epoch};
use log::{debug, info, warn};

use crate::{
    antenna::AntennaCatalog,
    error::{InputDataError, Result},
    fd::{OutputDescriptor, read_lines},
    rinex::{
        line::{LineKind, is_timeline, time_from_line},
        meta::RinexMeta,
    },
    utils::floor_to_grid,
};

/// Default observation period of drone receivers
pub fn default_obs_frequency() -> Duration {
    Duration::from_milliseconds(100.0)
}

/// Epoch record: the epoch line and all its observation lines, verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub time: Epoch,
    pub data: Vec<String>,
}

/// Time event (flag 5) record
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub time: Epoch,
    pub data: String,
}

/// Observation RINEX parser, able to rewrite the file around its time events.
#[derive(Debug, Clone)]
pub struct RinexParser {
    /// Source file
    pub path: PathBuf,

    /// Observation period
    obs_frequency: Duration,

    /// File content
    lines: Vec<String>,

    /// Header description
    pub meta: RinexMeta,

    /// Epochs, in file order
    epochs: Vec<EpochRecord>,

    /// Time events, chronological
    events: Vec<EventRecord>,

    /// Events left out of the last rewrite
    missed_events: Vec<EventRecord>,
}

impl RinexParser {
    /// Opens an observation RINEX file (possibly gzip compressed)
    pub fn open(
        path: &Path,
        obs_frequency: Duration,
        catalog: Option<&AntennaCatalog>,
    ) -> Result<Self> {
        let lines = read_lines(path)?;
        let mut parser = Self::from_lines(lines, obs_frequency, catalog)?;
        parser.path = path.to_path_buf();
        Ok(parser)
    }

    /// Builds a parser from the file content (terminations included)
    pub fn from_lines(
        lines: Vec<String>,
        obs_frequency: Duration,
        catalog: Option<&AntennaCatalog>,
    ) -> Result<Self> {
        let meta = RinexMeta::from_lines(&lines, catalog)?;
        Ok(Self {
            meta,
            lines,
            obs_frequency,
            path: PathBuf::new(),
            epochs: Vec::new(),
            events: Vec::new(),
            missed_events: Vec::new(),
        })
    }

    /// Events that could not be attached to an epoch during the last rewrite
    pub fn missed_events(&self) -> &[EventRecord] {
        &self.missed_events
    }

    /// Separates the body into epochs and time events.
    /// Each epoch absorbs the following lines, up to the next timeline.
    pub fn epochs_and_events(&mut self) -> Result<(&[EpochRecord], &[EventRecord])> {
        let mut epochs = Vec::<EpochRecord>::new();
        let mut events = Vec::<EventRecord>::new();

        let body = self
            .lines
            .get(self.meta.end_header_index + 1..)
            .unwrap_or_default();

        let mut index = 0;
        while index < body.len() {
            let line = &body[index];
            index += 1;

            match is_timeline(line) {
                LineKind::Event(_) => match time_from_line(line) {
                    Some(time) => events.push(EventRecord {
                        time,
                        data: line.clone(),
                    }),
                    None => warn!("invalid event date: {}", line.trim_end()),
                },
                LineKind::Epoch(_) => {
                    let Some(time) = time_from_line(line) else {
                        warn!("invalid epoch date: {}", line.trim_end());
                        continue;
                    };

                    let mut data = vec![line.clone()];
                    while index < body.len() && !is_timeline(&body[index]).is_timeline() {
                        data.push(body[index].clone());
                        index += 1;
                    }

                    epochs.push(EpochRecord { time, data });
                },
                LineKind::Other => {},
            }
        }

        if events.is_empty() {
            return Err(InputDataError::NoEvents.into());
        }

        if epochs.is_empty() {
            return Err(InputDataError::NoEpochs.into());
        }

        events.sort_by_key(|ev| ev.time);

        debug!(
            "{} - {} epochs, {} events",
            self.path.display(),
            epochs.len(),
            events.len()
        );

        self.epochs = epochs;
        self.events = events;

        Ok((&self.epochs, &self.events))
    }

    fn parse_once(&mut self) -> Result<()> {
        if self.epochs.is_empty() || self.events.is_empty() {
            self.epochs_and_events()?;
        }
        Ok(())
    }

    /// Attaches each event to the first epoch that follows it within one observation period.
    /// An event sharing its time with an epoch is attached to that epoch.
    /// Returns the epoch index of every event, None for missed events.
    fn placements(&self) -> Vec<Option<usize>> {
        let mut placements = vec![None; self.events.len()];
        let mut cursor = 0;

        for (index, epoch) in self.epochs.iter().enumerate() {
            while cursor < self.events.len() {
                let dt = epoch.time - self.events[cursor].time;
                if dt >= self.obs_frequency {
                    // no epoch close enough: missed
                    cursor += 1;
                } else if dt >= Duration::ZERO {
                    placements[cursor] = Some(index);
                    cursor += 1;
                } else {
                    break;
                }
            }
        }

        placements
    }

    /// Stores and reports the unplaced events, limited to `window` when set
    fn record_missed(&mut self, placements: &[Option<usize>], window: Option<(Epoch, Epoch)>) {
        self.missed_events = self
            .events
            .iter()
            .zip(placements.iter())
            .filter(|(event, placement)| {
                placement.is_none()
                    && window.is_none_or(|(start, end)| event.time >= start && event.time <= end)
            })
            .map(|(event, _)| event.clone())
            .collect();

        for missed in self.missed_events.iter() {
            warn!(
                "{} - missed event: {}",
                self.path.display(),
                missed.data.trim_end()
            );
        }
    }

    /// Epochs kept around each event in buffered mode:
    /// the epoch the event floors to on the observation grid, `buffer` epochs before and after it.
    fn buffered_epochs(&self, buffer: usize) -> BTreeSet<usize> {
        let index = self
            .epochs
            .iter()
            .enumerate()
            .map(|(i, epoch)| (epoch.time, i))
            .collect::<BTreeMap<_, _>>();

        let tolerance = Duration::from_microseconds(1.0);
        let step_ns = self.obs_frequency.total_nanoseconds();

        let lookup = |t: Epoch| {
            index
                .range(t - tolerance..=t + tolerance)
                .next()
                .map(|(_, i)| *i)
        };

        let mut selected = BTreeSet::new();

        for event in self.events.iter() {
            let nearest = floor_to_grid(event.time, self.obs_frequency);

            for k in 0..=buffer as i128 {
                let dt = Duration::from_total_nanoseconds(step_ns * k);
                if let Some(i) = lookup(nearest - dt) {
                    selected.insert(i);
                }
                if k > 0 {
                    if let Some(i) = lookup(nearest + dt) {
                        selected.insert(i);
                    }
                }
            }
        }

        selected
    }

    /// Writes a new observation RINEX, with time events placed right before
    /// the epoch that follows them.
    /// When `epochs_buffer` is set, only epochs surrounding the events are kept.
    /// Events with no following epoch within one observation period are missed,
    /// in both modes.
    pub fn make_obs_rinex(&mut self, path: &Path, epochs_buffer: Option<usize>) -> Result<()> {
        self.parse_once()?;
        let placements = self.placements();
        self.record_missed(&placements, None);

        let mut body = Vec::<&str>::with_capacity(self.lines.len());

        match epochs_buffer {
            None => {
                let mut cursor = 0;
                for (index, epoch) in self.epochs.iter().enumerate() {
                    while cursor < self.events.len() && placements[cursor] <= Some(index) {
                        if placements[cursor].is_some() {
                            body.push(&self.events[cursor].data);
                        }
                        cursor += 1;
                    }
                    body.extend(epoch.data.iter().map(|s| s.as_str()));
                }
            },
            Some(buffer) => {
                let selected = self.buffered_epochs(buffer);

                let mut pending = self
                    .events
                    .iter()
                    .zip(placements.iter())
                    .filter_map(|(event, placement)| placement.map(|_| event))
                    .peekable();

                for index in selected {
                    let epoch = &self.epochs[index];
                    while let Some(event) = pending.next_if(|ev| ev.time <= epoch.time) {
                        body.push(&event.data);
                    }
                    body.extend(epoch.data.iter().map(|s| s.as_str()));
                }

                body.extend(pending.map(|ev| ev.data.as_str()));
            },
        }

        self.write_obs_file(path, &body)?;

        info!(
            "{} - generated ({} events, {} missed)",
            path.display(),
            self.events.len() - self.missed_events.len(),
            self.missed_events.len()
        );

        Ok(())
    }

    /// Writes a new observation RINEX limited to the given time window,
    /// events included. Only events of the window may be missed.
    pub fn cut_by_time_bounds(&mut self, path: &Path, start: Epoch, end: Epoch) -> Result<()> {
        self.parse_once()?;
        let placements = self.placements();
        self.record_missed(&placements, Some((start, end)));

        let mut body = Vec::<&str>::with_capacity(self.lines.len());
        let mut cursor = 0;

        for (index, epoch) in self.epochs.iter().enumerate() {
            let retained = epoch.time >= start && epoch.time <= end;

            while cursor < self.events.len() && placements[cursor] <= Some(index) {
                if retained && placements[cursor].is_some() {
                    body.push(&self.events[cursor].data);
                }
                cursor += 1;
            }

            if retained {
                body.extend(epoch.data.iter().map(|s| s.as_str()));
            }
        }

        self.write_obs_file(path, &body)
    }

    /// Header verbatim, followed by the body
    fn write_obs_file(&self, path: &Path, body: &[&str]) -> Result<()> {
        let fd = OutputDescriptor::create(path)?;
        let mut writer = BufWriter::new(fd);

        for line in self.meta.header.iter() {
            writer.write_all(line.as_bytes())?;
        }

        for line in body {
            writer.write_all(line.as_bytes())?;
        }

        let fd = writer.into_inner().map_err(|e| e.into_error())?;
        fd.finish()?;
        Ok(())
    }
}
