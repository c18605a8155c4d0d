mod decode_tests;
mod pipeline_tests;
