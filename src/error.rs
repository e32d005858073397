use crate::entity::Entity;
use std::any::TypeId;
use thiserror::Error;

/// An error type which describes why an attempt to read a component failed.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComponentError {
    /// The entity is not alive.
    #[error("the entity {0} does not exist")]
    NoSuchEntity(Entity),

    /// The component was not found on the entity.
    #[error("the component {component_name} was not found on the entity {entity}")]
    Missing {
        entity: Entity,
        component_name: &'static str,
    },
}

impl ComponentError {
    pub(crate) fn missing<C: 'static>(entity: Entity) -> Self {
        ComponentError::Missing {
            entity,
            component_name: std::any::type_name::<C>(),
        }
    }
}

/// An error type which describes why a mutation of the store was rejected.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The entity was despawned or never existed.
    #[error("the entity {0} does not exist")]
    NoSuchEntity(Entity),
}

/// An error type which describes why a type lookup failed.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The type was never registered.
    #[error("the type {0:?} is not registered")]
    Unregistered(TypeId),

    /// The type is registered, but not as a component.
    #[error("the type {type_name} is not a component")]
    NotAComponent { type_name: &'static str },
}
