pub mod comparator;
pub mod default_order;
pub mod priority_order;
