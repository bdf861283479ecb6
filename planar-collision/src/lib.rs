//! Collision geometry for the planar 2-D physics engine.
//!
//! This crate provides everything the dynamics layer needs to answer "what is
//! touching what, where, and when":
//!
//! - [`Shape`] - the closed sum type of collision geometry (circle, edge,
//!   convex polygon, chain) with per-shape skin radii and mass properties
//! - [`Aabb`] - axis-aligned boxes and the fattening rules of the broad phase
//! - [`DynamicTree`] - the balanced AABB bounding-volume hierarchy used for
//!   overlap and ray queries over thousands of moving proxies
//! - [`distance`] - GJK closest-distance queries with simplex caching
//! - [`Manifold`] and [`collide`] - narrow-phase contact manifold generation
//! - [`time_of_impact`] - conservative advancement for continuous collision
//!
//! # Purity
//!
//! Narrow-phase functions are pure: given two shapes and two poses they
//! return a manifold and touch nothing else. All persistent state (the tree,
//! simplex caches) is owned by the caller, which keeps stepping deterministic
//! and replayable.

#![doc(html_root_url = "https://docs.rs/planar-collision/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that fight the geometry-heavy style of this crate
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::similar_names,      // xf_a / xf_b pairs are the domain vocabulary
    clippy::many_single_char_names,
)]

mod aabb;
pub mod collide;
pub mod distance;
mod dynamic_tree;
mod manifold;
mod raycast;
mod shape;
mod toi;

pub use aabb::Aabb;
pub use collide::{
    collide_circles, collide_edge_circle, collide_edge_polygon, collide_polygon_circle,
    collide_polygons, collide_shapes, flip_manifold,
};
pub use dynamic_tree::{DynamicTree, ProxyId, TreeLeaf, NULL_PROXY};
pub use manifold::{
    clip_segment_to_line, ClipList, ClipVertex, ContactFeature, FeatureType, Manifold,
    ManifoldKind, ManifoldPoint, WorldManifold,
};
pub use raycast::{RayCastInput, RayCastOutput};
pub use shape::{
    ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, DEFAULT_VERTEX_RADIUS,
};
pub use toi::{time_of_impact, SeparationFinder, ToiConf, ToiOutput, ToiState};

/// Maximum number of vertices a convex polygon shape may carry.
pub const MAX_POLYGON_VERTICES: usize = 8;
