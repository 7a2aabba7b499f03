//! Conversions between image/nalgebra types and `OpenCV` `Mat`s.

use crate::{
    utils::safe_cast::{u32_to_i32, usize_to_i32},
    Result,
};
use image::GrayImage;
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use opencv::core::{Mat, CV_64F, CV_8UC1};
use opencv::prelude::*;

/// Copy a grayscale image into a single channel 8-bit `Mat`
///
/// # Errors
///
/// Returns an error if the `Mat` cannot be allocated
pub fn gray_image_to_mat(image: &GrayImage) -> Result<Mat> {
    let rows = u32_to_i32(image.height())?;
    let cols = u32_to_i32(image.width())?;
    let mut mat = Mat::zeros(rows, cols, CV_8UC1)?.to_mat()?;
    for (x, y, pixel) in image.enumerate_pixels() {
        *mat.at_2d_mut::<u8>(u32_to_i32(y)?, u32_to_i32(x)?)? = pixel[0];
    }
    Ok(mat)
}

/// One row per point, columns x, y, z
///
/// # Errors
///
/// Returns an error if the `Mat` cannot be allocated
pub fn points3_to_mat(points: &[Point3<f64>]) -> Result<Mat> {
    let mut mat = Mat::zeros(usize_to_i32(points.len())?, 3, CV_64F)?.to_mat()?;
    for (i, point) in points.iter().enumerate() {
        let row = usize_to_i32(i)?;
        *mat.at_2d_mut::<f64>(row, 0)? = point.x;
        *mat.at_2d_mut::<f64>(row, 1)? = point.y;
        *mat.at_2d_mut::<f64>(row, 2)? = point.z;
    }
    Ok(mat)
}

/// One row per point, columns x, y
///
/// # Errors
///
/// Returns an error if the `Mat` cannot be allocated
pub fn points2_to_mat(points: &[Point2<f64>]) -> Result<Mat> {
    let mut mat = Mat::zeros(usize_to_i32(points.len())?, 2, CV_64F)?.to_mat()?;
    for (i, point) in points.iter().enumerate() {
        let row = usize_to_i32(i)?;
        *mat.at_2d_mut::<f64>(row, 0)? = point.x;
        *mat.at_2d_mut::<f64>(row, 1)? = point.y;
    }
    Ok(mat)
}

/// 3x3 double `Mat` from a matrix
///
/// # Errors
///
/// Returns an error if the `Mat` cannot be allocated
pub fn matrix3_to_mat(matrix: &Matrix3<f64>) -> Result<Mat> {
    let mut mat = Mat::zeros(3, 3, CV_64F)?.to_mat()?;
    for i in 0..3 {
        for j in 0..3 {
            *mat.at_2d_mut::<f64>(usize_to_i32(i)?, usize_to_i32(j)?)? = matrix[(i, j)];
        }
    }
    Ok(mat)
}

/// 3x1 double column `Mat`
///
/// # Errors
///
/// Returns an error if the `Mat` cannot be allocated
pub fn vector3_to_mat(vector: &Vector3<f64>) -> Result<Mat> {
    let mut mat = Mat::zeros(3, 1, CV_64F)?.to_mat()?;
    for i in 0..3 {
        *mat.at_2d_mut::<f64>(usize_to_i32(i)?, 0)? = vector[i];
    }
    Ok(mat)
}

/// Read a 3x1 double column `Mat`
///
/// # Errors
///
/// Returns an error if the `Mat` is not a 3x1 double column
pub fn mat_to_vector3(mat: &Mat) -> Result<Vector3<f64>> {
    Ok(Vector3::new(
        *mat.at_2d::<f64>(0, 0)?,
        *mat.at_2d::<f64>(1, 0)?,
        *mat.at_2d::<f64>(2, 0)?,
    ))
}
