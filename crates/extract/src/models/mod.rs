mod metadata;
mod package;

pub use self::metadata::Metadata;
pub use self::package::{Contributor, Identifier, MetaProperty, Package, PackageMetadata};
