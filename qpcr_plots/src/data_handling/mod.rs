pub mod expression;
pub mod p_values;
pub mod significance;
