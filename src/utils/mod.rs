pub mod exec;
pub mod fs;
pub mod ignore;
pub mod minify;
