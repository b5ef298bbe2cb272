mod common;

mod duplicates;
