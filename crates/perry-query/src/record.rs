//! Hydrated records.
//!
//! A record is a raw attribute map bound to its model type. Records are
//! cheap handles: cloning shares the underlying data, so an association
//! resolved through any clone is cached for all of them, and batch
//! preloading can attach results to records the caller already holds.

use crate::model::ModelType;
use crate::relation::Relation;
use perry_core::{Attributes, Error, Json, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A resolved association on one record.
#[derive(Clone)]
pub enum AssociationValue {
    /// A singular association: the one target record, if any.
    One(Option<Record>),
    /// A collection association: a relation whose results are shared by
    /// every reader of this record.
    Many(Rc<Relation>),
}

struct RecordInner {
    model: Arc<ModelType>,
    attributes: Attributes,
    associations: RefCell<BTreeMap<String, AssociationValue>>,
}

/// One fetched row, bound to its model type.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    pub(crate) fn new(model: Arc<ModelType>, attributes: Attributes) -> Self {
        Self {
            inner: Rc::new(RecordInner {
                model,
                attributes,
                associations: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// The model type this record belongs to.
    pub fn model(&self) -> &Arc<ModelType> {
        &self.inner.model
    }

    /// The raw attribute map.
    pub fn attributes(&self) -> &Attributes {
        &self.inner.attributes
    }

    /// One attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Json> {
        self.inner.attributes.get(name)
    }

    /// The primary key value, per the model's primary key attribute.
    pub fn id(&self) -> Option<&Json> {
        self.attribute(self.inner.model.primary_key())
    }

    /// Resolve an association by name, caching the result on this record.
    ///
    /// The first access of a collection association builds its relation
    /// lazily; the first read of a singular association fetches it. Either
    /// way repeat access reuses the cached value, and batch preloading
    /// fills this same cache ahead of time.
    pub fn association(&self, name: &str) -> Result<AssociationValue> {
        if let Some(cached) = self.inner.associations.borrow().get(name) {
            return Ok(cached.clone());
        }
        let descriptor = self
            .inner
            .model
            .association(name)
            .cloned()
            .ok_or_else(|| Error::association_not_found(self.inner.model.name(), name))?;

        let value = match descriptor.scope_for(self)? {
            Some(relation) => {
                if descriptor.is_collection() {
                    AssociationValue::Many(Rc::new(relation))
                } else {
                    AssociationValue::One(relation.first()?)
                }
            }
            // A missing owner key resolves empty without touching the
            // adapter.
            None => {
                if descriptor.is_collection() {
                    AssociationValue::Many(Rc::new(Relation::preloaded(
                        descriptor.resolved_target(&self.inner.model)?,
                        Vec::new(),
                    )))
                } else {
                    AssociationValue::One(None)
                }
            }
        };

        self.inner
            .associations
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Resolve a singular association to its target record.
    pub fn one(&self, name: &str) -> Result<Option<Record>> {
        match self.association(name)? {
            AssociationValue::One(record) => Ok(record),
            AssociationValue::Many(_) => Err(Error::argument(format!(
                "association '{name}' on model '{}' is a collection",
                self.inner.model.name()
            ))),
        }
    }

    /// Resolve a collection association to its relation.
    pub fn many(&self, name: &str) -> Result<Rc<Relation>> {
        match self.association(name)? {
            AssociationValue::Many(relation) => Ok(relation),
            AssociationValue::One(_) => Err(Error::argument(format!(
                "association '{name}' on model '{}' is singular",
                self.inner.model.name()
            ))),
        }
    }

    /// Whether an association result is already cached on this record.
    pub fn association_loaded(&self, name: &str) -> bool {
        self.inner.associations.borrow().contains_key(name)
    }

    pub(crate) fn store_association(&self, name: &str, value: AssociationValue) {
        self.inner
            .associations
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    /// Whether two handles point at the same underlying record.
    pub fn same_record(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.inner.model.qualified_name() == other.inner.model.qualified_name()
            && self.inner.attributes == other.inner.attributes
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.inner.model.name())
            .field("attributes", &self.inner.attributes)
            .finish()
    }
}

impl fmt::Debug for AssociationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationValue::One(record) => f.debug_tuple("One").field(record).finish(),
            AssociationValue::Many(_) => f.write_str("Many(..)"),
        }
    }
}
