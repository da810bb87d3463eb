//! Lockstep decoding of channel streams back into packets.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::codec::FrameStream;
use crate::encoding::AuxRecord;
use crate::error::{PclError, Result};
use crate::field::{ElementType, FieldArray};
use crate::packet::Packet;
use crate::planes::{Plane, recompose};
use crate::staging::Staging;

/// Advances N fallible sequences in unison.
///
/// Yields one item from every sequence per step. All sequences ending on the
/// same step ends the iteration; any sequence ending while another still
/// yields is a [`PclError::ConsistencyError`] naming both. The first error
/// ends the iteration.
pub struct Lockstep<I> {
    streams: Vec<(String, I)>,
    done: bool,
}

impl<I, T> Lockstep<I>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(streams: Vec<(String, I)>) -> Self {
        Self { streams, done: false }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl<I, T> Iterator for Lockstep<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.streams.is_empty() {
            return None;
        }

        let mut items = Vec::with_capacity(self.streams.len());
        let mut ended = None;
        let mut running = None;
        for (i, (_, stream)) in self.streams.iter_mut().enumerate() {
            match stream.next() {
                Some(Ok(item)) => {
                    running.get_or_insert(i);
                    items.push(item);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    ended.get_or_insert(i);
                }
            }
        }

        match (ended, running) {
            (None, _) => Some(Ok(items)),
            (Some(_), None) => {
                self.done = true;
                None
            }
            (Some(ended), Some(running)) => {
                self.done = true;
                Some(Err(PclError::ConsistencyError(format!(
                    "stream {} ended while {} still has frames",
                    self.streams[ended].0, self.streams[running].0
                ))))
            }
        }
    }
}

/// One packet rebuilt from the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedPacket {
    /// Position in the archive's frame order
    pub index: usize,
    pub timestamp: u64,
    pub fields: BTreeMap<String, FieldArray>,
    pub aux: BTreeMap<String, FieldArray>,
}

impl From<ReconstructedPacket> for Packet {
    fn from(packet: ReconstructedPacket) -> Self {
        Packet {
            timestamp: packet.timestamp,
            fields: packet.fields,
            aux: packet.aux,
        }
    }
}

/// Field layout needed to recompose one field per step.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Vec<usize>,
}

impl FieldPlan {
    fn channel_count(&self) -> usize {
        self.element_type.byte_width()
    }
}

/// Forward-only iterator over reconstructed packets.
///
/// Owns its decode streams; dropping it early stops every decoder.
pub struct ReconstructionIterator {
    frames: Lockstep<FrameStream>,
    fields: Vec<FieldPlan>,
    timestamps: Vec<u64>,
    aux: BTreeMap<String, VecDeque<AuxRecord>>,
    produced: usize,
    done: bool,
    _staging: Option<Arc<Staging>>,
}

impl ReconstructionIterator {
    /// `streams` must hold every field's channels in field order, channels ascending.
    pub fn new(
        streams: Vec<(String, FrameStream)>,
        fields: Vec<FieldPlan>,
        timestamps: Vec<u64>,
        aux: BTreeMap<String, Vec<AuxRecord>>,
    ) -> Result<Self> {
        let expected: usize = fields.iter().map(FieldPlan::channel_count).sum();
        if streams.len() != expected {
            return Err(PclError::CorruptLayout(format!(
                "{} channel streams for fields needing {expected}",
                streams.len()
            )));
        }

        Ok(Self {
            frames: Lockstep::new(streams),
            fields,
            timestamps,
            aux: aux.into_iter().map(|(kind, records)| (kind, records.into())).collect(),
            produced: 0,
            done: false,
            _staging: None,
        })
    }

    /// Keep the directory the streams were extracted to alive as long as the iterator.
    pub(crate) fn holding(mut self, staging: Arc<Staging>) -> Self {
        self._staging = Some(staging);
        self
    }

    /// Packets the archive index promises.
    pub fn num_scans(&self) -> usize {
        self.timestamps.len()
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    fn assemble(&mut self, planes: Vec<Plane>) -> Result<ReconstructedPacket> {
        let index = self.produced;
        let timestamp = *self.timestamps.get(index).ok_or_else(|| {
            PclError::ConsistencyError(format!(
                "channel streams hold more than the {} indexed frames",
                self.timestamps.len()
            ))
        })?;

        let mut fields = BTreeMap::new();
        let mut planes = planes.as_slice();
        for field in &self.fields {
            let (own, rest) = planes.split_at(field.channel_count());
            planes = rest;
            let array = recompose(own, field.element_type, &field.shape)?;
            fields.insert(field.name.clone(), array);
        }

        // Aux records are in frame order; kinds missing for this packet keep their cursor
        let mut aux = BTreeMap::new();
        for (kind, records) in &mut self.aux {
            if records.front().is_some_and(|record| record.frame == index as u64)
                && let Some(record) = records.pop_front()
            {
                aux.insert(kind.clone(), record.array);
            }
        }

        self.produced += 1;
        Ok(ReconstructedPacket {
            index,
            timestamp,
            fields,
            aux,
        })
    }
}

impl Iterator for ReconstructionIterator {
    type Item = Result<ReconstructedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match self.frames.next() {
            Some(Ok(planes)) => self.assemble(planes),
            Some(Err(e)) => Err(e),
            None if self.produced < self.timestamps.len() => Err(PclError::ConsistencyError(format!(
                "channel streams ended after {} of {} frames",
                self.produced,
                self.timestamps.len()
            ))),
            None => {
                self.done = true;
                return None;
            }
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.timestamps.len().saturating_sub(self.produced)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planes::decompose;

    fn counting(name: &str, n: usize) -> (String, std::vec::IntoIter<Result<usize>>) {
        let items: Vec<Result<usize>> = (0..n).map(Ok).collect();
        (name.to_string(), items.into_iter())
    }

    #[test]
    fn test_lockstep_equal_lengths() {
        let steps: Vec<Vec<usize>> = Lockstep::new(vec![counting("a", 3), counting("b", 3)])
            .map(|step| step.unwrap())
            .collect();
        assert_eq!(steps, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
    }

    #[test]
    fn test_lockstep_unequal_lengths() {
        let mut lockstep = Lockstep::new(vec![counting("range_ch0", 3), counting("range_ch1", 2)]);
        assert!(lockstep.next().unwrap().is_ok());
        assert!(lockstep.next().unwrap().is_ok());

        let err = lockstep.next().unwrap().unwrap_err();
        assert!(matches!(err, PclError::ConsistencyError(ref msg) if msg.contains("range_ch1")));
        assert!(lockstep.next().is_none());
    }

    #[test]
    fn test_lockstep_stops_at_first_error() {
        let failing: Vec<Result<usize>> = vec![Ok(0), Err(PclError::decode("b", "boom")), Ok(2)];
        let mut lockstep = Lockstep::new(vec![
            counting("a", 3),
            ("b".to_string(), failing.into_iter()),
        ]);

        assert!(lockstep.next().unwrap().is_ok());
        assert!(matches!(lockstep.next(), Some(Err(PclError::DecodeFailure { .. }))));
        assert!(lockstep.next().is_none());
    }

    fn stream_of(planes: Vec<Plane>) -> FrameStream {
        Box::new(planes.into_iter().map(Ok))
    }

    fn u16_field(values: &[u16]) -> FieldArray {
        FieldArray::from_values(vec![1, values.len()], values).unwrap()
    }

    fn iterator_for(packets: &[FieldArray], timestamps: Vec<u64>) -> ReconstructionIterator {
        let mut low = Vec::new();
        let mut high = Vec::new();
        for array in packets {
            let mut planes = decompose(array).unwrap().into_iter();
            low.push(planes.next().unwrap());
            high.push(planes.next().unwrap());
        }

        let plan = FieldPlan {
            name: "signal".to_string(),
            element_type: ElementType::U16,
            shape: vec![1, 3],
        };
        let aux = BTreeMap::from([(
            "status".to_string(),
            vec![AuxRecord::new(0, timestamps[0], FieldArray::from_values(vec![1], &[7u32]).unwrap())],
        )]);

        ReconstructionIterator::new(
            vec![
                ("signal_ch0".to_string(), stream_of(low)),
                ("signal_ch1".to_string(), stream_of(high)),
            ],
            vec![plan],
            timestamps,
            aux,
        )
        .unwrap()
    }

    #[test]
    fn test_reconstruct_packets() {
        let arrays = vec![u16_field(&[1, 256, 65535]), u16_field(&[9, 8, 7])];
        let packets: Vec<ReconstructedPacket> = iterator_for(&arrays, vec![10, 20])
            .map(|p| p.unwrap())
            .collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].fields["signal"], arrays[0]);
        assert_eq!(packets[1].fields["signal"], arrays[1]);
        assert_eq!(packets[1].timestamp, 20);
        assert_eq!(packets[1].index, 1);
        assert!(packets[0].aux.contains_key("status"));
        assert!(packets[1].aux.is_empty());
    }

    #[test]
    fn test_aux_follows_frame_not_timestamp() {
        let arrays = vec![u16_field(&[1, 2, 3]), u16_field(&[4, 5, 6])];
        let mut iter = iterator_for(&arrays, vec![10, 10]);
        iter.aux.insert(
            "pose".to_string(),
            VecDeque::from([AuxRecord::new(1, 10, FieldArray::from_values(vec![3], &[0.5f32; 3]).unwrap())]),
        );

        let packets: Vec<ReconstructedPacket> = iter.map(|p| p.unwrap()).collect();
        assert_eq!(packets[0].aux.keys().collect::<Vec<_>>(), vec!["status"]);
        assert_eq!(packets[1].aux.keys().collect::<Vec<_>>(), vec!["pose"]);
    }

    #[test]
    fn test_short_streams_are_inconsistent() {
        let arrays = vec![u16_field(&[1, 2, 3])];
        let mut iter = iterator_for(&arrays, vec![10, 20, 30]);

        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(PclError::ConsistencyError(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_long_streams_are_inconsistent() {
        let arrays = vec![u16_field(&[1, 2, 3]), u16_field(&[4, 5, 6])];
        let mut iter = iterator_for(&arrays, vec![10]);

        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(PclError::ConsistencyError(_)))));
    }

    #[test]
    fn test_stream_count_must_match_fields() {
        let plan = FieldPlan {
            name: "range".to_string(),
            element_type: ElementType::U32,
            shape: vec![2, 2],
        };
        let result = ReconstructionIterator::new(
            vec![("range_ch0".to_string(), stream_of(Vec::new()))],
            vec![plan],
            vec![1],
            BTreeMap::new(),
        );
        assert!(matches!(result, Err(PclError::CorruptLayout(_))));
    }
}
