pub mod ms70cdr;
