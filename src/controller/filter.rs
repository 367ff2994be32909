//! # Class Filter
//!
//! Several operator deployments can share a cluster. Each one only reconciles
//! the resources labelled with its class.

use crate::constants::CLASS_LABEL;
use kube::ResourceExt;

/// Class of a resource, an absent label being the empty class
pub fn class_of<K: ResourceExt>(obj: &K) -> &str {
    obj.labels().get(CLASS_LABEL).map_or("", String::as_str)
}

/// Whether an operator configured with `class_name` owns `obj`
pub fn matches_class<K: ResourceExt>(obj: &K, class_name: &str) -> bool {
    class_of(obj) == class_name
}
