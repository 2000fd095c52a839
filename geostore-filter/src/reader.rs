//! Filtering reader.

use crate::ir::Filter;
use geostore_core::{Error, Feature, FeatureReader, FeatureType, ReaderState, Result};
use std::sync::Arc;

/// Yields only the features of `inner` that satisfy a filter.
///
/// Evaluation errors are returned from `has_next()` and poison the reader.
pub struct FilteringReader<R: FeatureReader> {
    inner: R,
    filter: Filter,
    next: Option<Feature>,
    state: ReaderState,
}

impl<R: FeatureReader> FilteringReader<R> {
    pub fn new(inner: R, filter: Filter) -> Self {
        let filter = filter.simplify();
        let state = if filter.is_exclude() {
            ReaderState::Exhausted
        } else {
            ReaderState::Open
        };
        Self {
            inner,
            filter,
            next: None,
            state,
        }
    }

    fn advance(&mut self) -> Result<bool> {
        while self.inner.has_next()? {
            let feature = self.inner.next()?;
            if self.filter.evaluate(&feature)? {
                self.next = Some(feature);
                return Ok(true);
            }
        }
        self.state = ReaderState::Exhausted;
        Ok(false)
    }
}

impl<R: FeatureReader> FeatureReader for FilteringReader<R> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.check()?;
        if self.next.is_some() {
            return Ok(true);
        }
        if self.state == ReaderState::Exhausted {
            return Ok(false);
        }
        self.advance().inspect_err(|e| {
            if e.is_fatal() {
                self.state = ReaderState::Failed;
            }
        })
    }

    fn next(&mut self) -> Result<Feature> {
        if !self.has_next()? {
            return Err(Error::NoSuchElement);
        }
        self.next.take().ok_or(Error::NoSuchElement)
    }

    fn close(&mut self) {
        if !self.state.is_closed() {
            self.inner.close();
            self.next = None;
            self.state = ReaderState::Closed;
        }
    }
}
