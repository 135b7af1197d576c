pub mod cast_loss_fusion;
