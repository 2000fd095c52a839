//! Forward-only feature cursors.
//!
//! Readers follow a pull protocol:
//! 1. `has_next()` - advance until a feature is buffered or the source ends
//! 2. `next()` - take the buffered feature (`NoSuchElement` if none)
//! 3. `close()` - release the source; idempotent
//!
//! A reader that returns a fatal error from `has_next()`/`next()` is poisoned:
//! later calls return [`Error::ReaderFailed`] until it is closed. Calls after
//! `close()` return [`Error::ReaderClosed`].

use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::feature_type::FeatureType;
use std::sync::Arc;

/// Forward-only cursor over features of one type.
pub trait FeatureReader {
    /// Type of the features this reader yields.
    fn feature_type(&self) -> &Arc<FeatureType>;

    /// True if a call to `next()` will return a feature.
    fn has_next(&mut self) -> Result<bool>;

    /// Return the next feature.
    fn next(&mut self) -> Result<Feature>;

    /// Release resources. Safe to call more than once.
    fn close(&mut self);
}

impl<R: FeatureReader + ?Sized> FeatureReader for Box<R> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        (**self).feature_type()
    }

    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }

    fn next(&mut self) -> Result<Feature> {
        (**self).next()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Boxed reader for dynamic dispatch
pub type BoxedFeatureReader = Box<dyn FeatureReader + Send>;

/// Reader state for lifecycle tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Producing features
    Open,
    /// Source exhausted
    Exhausted,
    /// A fatal error was returned; no further features
    Failed,
    /// Closed by the caller
    Closed,
}

impl ReaderState {
    /// Error to return for a call made in this state, if the call may not
    /// proceed.
    pub fn check(&self) -> Result<()> {
        match self {
            ReaderState::Open | ReaderState::Exhausted => Ok(()),
            ReaderState::Failed => Err(Error::ReaderFailed),
            ReaderState::Closed => Err(Error::ReaderClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ReaderState::Closed)
    }
}

/// Reader over an in-memory list of features.
#[derive(Debug)]
pub struct CollectionReader {
    feature_type: Arc<FeatureType>,
    features: std::vec::IntoIter<Feature>,
    state: ReaderState,
}

impl CollectionReader {
    pub fn new(feature_type: Arc<FeatureType>, features: Vec<Feature>) -> Self {
        Self {
            feature_type,
            features: features.into_iter(),
            state: ReaderState::Open,
        }
    }
}

impl FeatureReader for CollectionReader {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.check()?;
        Ok(!self.features.as_slice().is_empty())
    }

    fn next(&mut self) -> Result<Feature> {
        self.state.check()?;
        match self.features.next() {
            Some(f) => Ok(f),
            None => {
                self.state = ReaderState::Exhausted;
                Err(Error::NoSuchElement)
            }
        }
    }

    fn close(&mut self) {
        self.features = Vec::new().into_iter();
        self.state = ReaderState::Closed;
    }
}

/// Stops a delegate reader after `max_features` features.
pub struct MaxFeaturesReader<R: FeatureReader> {
    inner: R,
    max_features: usize,
    returned: usize,
}

impl<R: FeatureReader> MaxFeaturesReader<R> {
    pub fn new(inner: R, max_features: usize) -> Self {
        Self {
            inner,
            max_features,
            returned: 0,
        }
    }
}

impl<R: FeatureReader> FeatureReader for MaxFeaturesReader<R> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> Result<bool> {
        if self.returned >= self.max_features {
            return Ok(false);
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> Result<Feature> {
        if self.returned >= self.max_features {
            return Err(Error::NoSuchElement);
        }
        let feature = self.inner.next()?;
        self.returned += 1;
        Ok(feature)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Drain a reader into a vector and close it.
///
/// The reader is closed on both the success and the error path.
pub fn read_all<R: FeatureReader + ?Sized>(reader: &mut R) -> Result<Vec<Feature>> {
    let mut out = Vec::new();
    let result = loop {
        match reader.has_next() {
            Ok(true) => match reader.next() {
                Ok(f) => out.push(f),
                Err(e) => break Err(e),
            },
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    reader.close();
    result.map(|()| out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_type::AttributeBinding;

    fn features(n: usize) -> (Arc<FeatureType>, Vec<Feature>) {
        let ft = FeatureType::builder("pts")
            .attribute("n", AttributeBinding::Long)
            .build()
            .unwrap();
        let fs = (0..n)
            .map(|i| {
                Feature::builder(&ft)
                    .set("n", i as i64)
                    .unwrap()
                    .build(format!("pts.{}", i))
                    .unwrap()
            })
            .collect();
        (ft, fs)
    }

    #[test]
    fn test_collection_reader_protocol() {
        let (ft, fs) = features(2);
        let mut reader = CollectionReader::new(ft, fs);
        assert!(reader.has_next().unwrap());
        assert_eq!(reader.next().unwrap().id().as_str(), "pts.0");
        assert_eq!(reader.next().unwrap().id().as_str(), "pts.1");
        assert!(!reader.has_next().unwrap());
        assert!(matches!(reader.next(), Err(Error::NoSuchElement)));
    }

    #[test]
    fn test_use_after_close() {
        let (ft, fs) = features(1);
        let mut reader = CollectionReader::new(ft, fs);
        reader.close();
        reader.close();
        assert!(matches!(reader.has_next(), Err(Error::ReaderClosed)));
    }

    #[test]
    fn test_max_features() {
        let (ft, fs) = features(5);
        let mut reader = MaxFeaturesReader::new(CollectionReader::new(ft, fs), 3);
        let out = read_all(&mut reader).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_boxed_reader() {
        let (ft, fs) = features(3);
        let mut reader: BoxedFeatureReader = Box::new(CollectionReader::new(ft, fs));
        assert_eq!(read_all(&mut reader).unwrap().len(), 3);
    }
}
