pub mod meter_session;
