mod store;

pub use store::{PreferenceStore, Preferences};
