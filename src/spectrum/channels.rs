use std::ops::{Index, IndexMut};

use thiserror::Error;

/// Errors that arise when two sample buffers that should share a shape do not
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpectrumShapeError {
    #[error("Expected {expected} channels but found {found}")]
    ChannelCountMismatch { expected: usize, found: usize },
    #[error("Expected {expected} samples per channel but found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Channel {channel} has {found} samples, the buffer holds {expected} per channel")]
    RaggedChannel {
        channel: usize,
        expected: usize,
        found: usize,
    },
}

/// An owned, rectangular set of per-channel sample arrays.
///
/// Every channel holds exactly [`ChannelData::len`] samples. Arithmetic between
/// two buffers checks both the channel count and the channel length first and
/// reports a [`SpectrumShapeError`] rather than reading out of bounds.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelData {
    channels: Vec<Vec<f64>>,
    length: usize,
}

impl ChannelData {
    /// Allocate `channel_count` channels of `length` zeros
    pub fn zeros(channel_count: usize, length: usize) -> Self {
        Self {
            channels: vec![vec![0.0; length]; channel_count],
            length,
        }
    }

    /// Wrap pre-existing channel arrays, checking that they all share one length
    pub fn from_channels(channels: Vec<Vec<f64>>) -> Result<Self, SpectrumShapeError> {
        let length = channels.first().map(|c| c.len()).unwrap_or_default();
        for (i, c) in channels.iter().enumerate() {
            if c.len() != length {
                return Err(SpectrumShapeError::RaggedChannel {
                    channel: i,
                    expected: length,
                    found: c.len(),
                });
            }
        }
        Ok(Self { channels, length })
    }

    /// A single channel buffer
    pub fn single(samples: Vec<f64>) -> Self {
        let length = samples.len();
        Self {
            channels: vec![samples],
            length,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The number of samples in each channel
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0 || self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f64]> {
        self.channels.get_mut(index).map(|c| c.as_mut_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.channels.iter().map(|c| c.as_slice())
    }

    pub fn into_channels(self) -> Vec<Vec<f64>> {
        self.channels
    }

    /// Check that `other` can be combined sample-wise with `self`
    pub fn check_shape(&self, other: &ChannelData) -> Result<(), SpectrumShapeError> {
        if self.channel_count() != other.channel_count() {
            return Err(SpectrumShapeError::ChannelCountMismatch {
                expected: self.channel_count(),
                found: other.channel_count(),
            });
        }
        if self.len() != other.len() {
            return Err(SpectrumShapeError::LengthMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        Ok(())
    }

    /// Subtract `other` from `self` channel-wise, sample-wise
    pub fn try_sub_assign(&mut self, other: &ChannelData) -> Result<(), SpectrumShapeError> {
        self.check_shape(other)?;
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            dst.iter_mut().zip(src.iter()).for_each(|(a, b)| *a -= *b);
        }
        Ok(())
    }

    /// Add `other` to `self` channel-wise, sample-wise
    pub fn try_add_assign(&mut self, other: &ChannelData) -> Result<(), SpectrumShapeError> {
        self.check_shape(other)?;
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            dst.iter_mut().zip(src.iter()).for_each(|(a, b)| *a += *b);
        }
        Ok(())
    }

    /// Produce `self - other` without modifying either buffer
    pub fn try_sub(&self, other: &ChannelData) -> Result<ChannelData, SpectrumShapeError> {
        let mut dup = self.clone();
        dup.try_sub_assign(other)?;
        Ok(dup)
    }

    pub fn scale(&mut self, factor: f64) {
        self.channels
            .iter_mut()
            .flat_map(|c| c.iter_mut())
            .for_each(|v| *v *= factor);
    }

    pub fn fill(&mut self, value: f64) {
        self.channels
            .iter_mut()
            .for_each(|c| c.iter_mut().for_each(|v| *v = value));
    }

    /// A zero-filled buffer with the same shape as `self`
    pub fn zeros_like(&self) -> ChannelData {
        Self::zeros(self.channel_count(), self.len())
    }
}

impl Index<usize> for ChannelData {
    type Output = [f64];

    fn index(&self, index: usize) -> &Self::Output {
        &self.channels[index]
    }
}

impl IndexMut<usize> for ChannelData {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.channels[index]
    }
}

/// Sum of `samples[low..high]`, with the bounds clamped to the slice.
pub fn sum_between(samples: &[f64], low: usize, high: usize) -> f64 {
    let high = high.min(samples.len());
    if low >= high {
        return 0.0;
    }
    samples[low..high].iter().sum()
}

/// Mean of `samples[low..high]`, with the bounds clamped to the slice. An empty
/// window averages to zero.
pub fn average_between(samples: &[f64], low: usize, high: usize) -> f64 {
    let high = high.min(samples.len());
    if low >= high {
        return 0.0;
    }
    sum_between(samples, low, high) / (high - low) as f64
}

pub fn average(samples: &[f64]) -> f64 {
    average_between(samples, 0, samples.len())
}

pub fn min_max(samples: &[f64]) -> Option<(f64, f64)> {
    let first = *samples.first()?;
    Some(
        samples
            .iter()
            .fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sub_shape_checked() {
        let mut a = ChannelData::single(vec![3.0, 3.0, 3.0, 3.0]);
        let b = ChannelData::single(vec![1.0, 1.0, 1.0, 1.0]);
        a.try_sub_assign(&b).unwrap();
        assert_eq!(a.channel(0).unwrap(), &[2.0, 2.0, 2.0, 2.0]);

        let short = ChannelData::single(vec![1.0, 1.0]);
        let err = a.try_sub_assign(&short).unwrap_err();
        assert_eq!(
            err,
            SpectrumShapeError::LengthMismatch {
                expected: 4,
                found: 2
            }
        );

        let two = ChannelData::zeros(2, 4);
        assert!(matches!(
            a.try_sub(&two),
            Err(SpectrumShapeError::ChannelCountMismatch { .. })
        ));
    }

    #[test]
    fn test_ragged_rejected() {
        let err = ChannelData::from_channels(vec![vec![1.0; 4], vec![1.0; 3]]).unwrap_err();
        assert!(matches!(err, SpectrumShapeError::RaggedChannel { channel: 1, .. }));
    }

    #[test]
    fn test_window_statistics() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(average_between(&samples, 1, 3), 2.5);
        assert_eq!(average_between(&samples, 3, 100), 4.5);
        assert_eq!(average_between(&samples, 4, 2), 0.0);
        assert_eq!(average(&samples), 3.0);
        assert_eq!(min_max(&samples), Some((1.0, 5.0)));
        assert_eq!(min_max(&[]), None);
    }
}
