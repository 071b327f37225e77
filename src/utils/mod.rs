pub mod byte_view;
