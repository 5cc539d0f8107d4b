//! IO modules - side effects (filesystem, archives)

pub mod extract;
