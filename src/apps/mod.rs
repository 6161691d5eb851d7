pub mod ms70cdr_control;
