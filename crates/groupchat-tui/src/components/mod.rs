pub mod message_list;
